use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A catalog question. Read-only to the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    pub prompt: String,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.details.kind()
    }

    /// Content safe to show a student mid-exam.
    pub fn public_content(&self) -> QuestionContent {
        let body = match &self.details {
            QuestionDetails::SingleChoice(sc) => PublicDetails::SingleChoice {
                options: sc.options.clone(),
            },
            QuestionDetails::DragDrop(dd) => PublicDetails::DragDrop {
                items: dd.items.clone(),
                slots: dd.slots.clone(),
            },
        };
        QuestionContent {
            question_id: self.id,
            prompt: self.prompt.clone(),
            details: body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    DragDrop,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::DragDrop => "drag_drop",
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionKind::SingleChoice),
            "drag_drop" => Ok(QuestionKind::DragDrop),
            other => Err(format!("unknown question kind '{}'", other)),
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionDetails {
    SingleChoice(SingleChoiceDetails),
    DragDrop(DragDropDetails),
}

impl QuestionDetails {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionDetails::SingleChoice(_) => QuestionKind::SingleChoice,
            QuestionDetails::DragDrop(_) => QuestionKind::DragDrop,
        }
    }
}

/// The four-way option set of a single-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChoiceOption {
    A,
    B,
    C,
    D,
}

impl ChoiceOption {
    pub fn index(&self) -> usize {
        match self {
            ChoiceOption::A => 0,
            ChoiceOption::B => 1,
            ChoiceOption::C => 2,
            ChoiceOption::D => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceOption::A => "A",
            ChoiceOption::B => "B",
            ChoiceOption::C => "C",
            ChoiceOption::D => "D",
        }
    }
}

impl FromStr for ChoiceOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(ChoiceOption::A),
            "B" => Ok(ChoiceOption::B),
            "C" => Ok(ChoiceOption::C),
            "D" => Ok(ChoiceOption::D),
            other => Err(format!("'{}' is not one of A, B, C, D", other)),
        }
    }
}

impl fmt::Display for ChoiceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleChoiceDetails {
    /// Option texts in A, B, C, D order.
    pub options: [String; 4],
    pub correct_option: ChoiceOption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragItem {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropSlot {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DragDropDetails {
    pub items: Vec<DragItem>,
    pub slots: Vec<DropSlot>,
    /// item id -> slot id
    pub correct_mapping: BTreeMap<i64, i64>,
}

/// Question payload with the answer key stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionContent {
    pub question_id: i64,
    pub prompt: String,
    #[serde(flatten)]
    pub details: PublicDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublicDetails {
    SingleChoice { options: [String; 4] },
    DragDrop { items: Vec<DragItem>, slots: Vec<DropSlot> },
}

/// Pool entry returned when sampling; content is fetched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub question_id: i64,
    pub kind: QuestionKind,
}
