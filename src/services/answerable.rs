use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::answer::AnswerValue;
use crate::models::question::{
    ChoiceOption, DragDropDetails, Question, QuestionDetails, QuestionKind, SingleChoiceDetails,
};

/// What a question kind must provide to take part in a session.
pub trait Answerable: Send + Sync {
    fn kind(&self) -> QuestionKind;

    /// Parses a raw client payload. Malformed payloads are `InvalidInput`;
    /// well-formed but wrong answers are accepted.
    fn validate(&self, payload: &JsonValue) -> Result<AnswerValue>;

    fn is_correct(&self, answer: &AnswerValue) -> bool;

    fn correct_answer(&self) -> AnswerValue;

    /// Review rendering of an answer, with labels resolved.
    fn render(&self, answer: &AnswerValue) -> JsonValue;
}

/// Picks the answer capability of `question`, checking it against the kind
/// tag recorded on the session slot.
pub fn answerable_for(question: &Question, slot_kind: QuestionKind) -> Result<&dyn Answerable> {
    let answerable: &dyn Answerable = match &question.details {
        QuestionDetails::SingleChoice(sc) => sc,
        QuestionDetails::DragDrop(dd) => dd,
    };
    if answerable.kind() != slot_kind {
        return Err(Error::Internal(format!(
            "question {} is {} but its session slot is tagged {}",
            question.id,
            answerable.kind(),
            slot_kind
        )));
    }
    Ok(answerable)
}

impl Answerable for SingleChoiceDetails {
    fn kind(&self) -> QuestionKind {
        QuestionKind::SingleChoice
    }

    fn validate(&self, payload: &JsonValue) -> Result<AnswerValue> {
        let raw = payload.as_str().ok_or_else(|| {
            Error::InvalidInput(
                "Single-choice answer must be one of \"A\", \"B\", \"C\", \"D\"".to_string(),
            )
        })?;
        let option = raw.parse::<ChoiceOption>().map_err(Error::InvalidInput)?;
        Ok(AnswerValue::Option(option))
    }

    fn is_correct(&self, answer: &AnswerValue) -> bool {
        matches!(answer, AnswerValue::Option(option) if *option == self.correct_option)
    }

    fn correct_answer(&self) -> AnswerValue {
        AnswerValue::Option(self.correct_option)
    }

    fn render(&self, answer: &AnswerValue) -> JsonValue {
        match answer {
            AnswerValue::Option(option) => json!({
                "option": option,
                "text": self.options[option.index()],
            }),
            AnswerValue::Mapping(_) => JsonValue::Null,
        }
    }
}

impl DragDropDetails {
    fn has_item(&self, item_id: i64) -> bool {
        self.items.iter().any(|i| i.id == item_id)
    }

    fn slot_label(&self, slot_id: i64) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.id == slot_id)
            .map(|s| s.label.as_str())
    }
}

impl Answerable for DragDropDetails {
    fn kind(&self) -> QuestionKind {
        QuestionKind::DragDrop
    }

    fn validate(&self, payload: &JsonValue) -> Result<AnswerValue> {
        let object = payload.as_object().ok_or_else(|| {
            Error::InvalidInput(
                "Drag-drop answer must be an object of item id to slot id".to_string(),
            )
        })?;

        let mut mapping = BTreeMap::new();
        for (key, value) in object {
            let item_id: i64 = key
                .trim()
                .parse()
                .map_err(|_| Error::InvalidInput(format!("'{}' is not a valid item id", key)))?;
            let slot_id = value.as_i64().ok_or_else(|| {
                Error::InvalidInput(format!("Slot for item {} must be an integer id", item_id))
            })?;
            if !self.has_item(item_id) {
                return Err(Error::InvalidInput(format!("Unknown item id {}", item_id)));
            }
            if self.slot_label(slot_id).is_none() {
                return Err(Error::InvalidInput(format!("Unknown slot id {}", slot_id)));
            }
            if mapping.insert(item_id, slot_id).is_some() {
                return Err(Error::InvalidInput(format!("Item {} is placed twice", item_id)));
            }
        }
        Ok(AnswerValue::Mapping(mapping))
    }

    /// All-or-nothing: every item placed, every placement right.
    fn is_correct(&self, answer: &AnswerValue) -> bool {
        let AnswerValue::Mapping(mapping) = answer else {
            return false;
        };
        mapping.len() == self.items.len()
            && self.items.iter().all(|item| {
                match (mapping.get(&item.id), self.correct_mapping.get(&item.id)) {
                    (Some(given), Some(expected)) => given == expected,
                    _ => false,
                }
            })
    }

    fn correct_answer(&self) -> AnswerValue {
        AnswerValue::Mapping(self.correct_mapping.clone())
    }

    fn render(&self, answer: &AnswerValue) -> JsonValue {
        let AnswerValue::Mapping(mapping) = answer else {
            return JsonValue::Null;
        };
        let placements: Vec<JsonValue> = self
            .items
            .iter()
            .filter_map(|item| {
                mapping.get(&item.id).map(|slot_id| {
                    json!({
                        "item_id": item.id,
                        "item": item.label,
                        "slot_id": slot_id,
                        "slot": self.slot_label(*slot_id),
                    })
                })
            })
            .collect();
        JsonValue::Array(placements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{DragItem, DropSlot};

    fn three_by_three() -> DragDropDetails {
        DragDropDetails {
            items: (1..=3)
                .map(|id| DragItem { id, label: format!("item {}", id) })
                .collect(),
            slots: (1..=3)
                .map(|id| DropSlot { id, label: format!("slot {}", id) })
                .collect(),
            correct_mapping: BTreeMap::from([(1, 1), (2, 2), (3, 3)]),
        }
    }

    fn capitals() -> SingleChoiceDetails {
        SingleChoiceDetails {
            options: [
                "Paris".to_string(),
                "Rome".to_string(),
                "Madrid".to_string(),
                "Berlin".to_string(),
            ],
            correct_option: ChoiceOption::A,
        }
    }

    #[test]
    fn single_choice_accepts_only_the_four_options() {
        let q = capitals();
        assert_eq!(q.validate(&json!("b")).unwrap(), AnswerValue::Option(ChoiceOption::B));
        assert!(matches!(q.validate(&json!("E")), Err(Error::InvalidInput(_))));
        assert!(matches!(q.validate(&json!(1)), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn single_choice_correctness_compares_with_key() {
        let q = capitals();
        assert!(q.is_correct(&AnswerValue::Option(ChoiceOption::A)));
        assert!(!q.is_correct(&AnswerValue::Option(ChoiceOption::C)));
        assert_eq!(q.render(&AnswerValue::Option(ChoiceOption::D))["text"], "Berlin");
    }

    #[test]
    fn drag_drop_full_correct_mapping_is_correct() {
        let q = three_by_three();
        let answer = q.validate(&json!({"1": 1, "2": 2, "3": 3})).unwrap();
        assert!(q.is_correct(&answer));
    }

    #[test]
    fn drag_drop_partial_mapping_is_wrong_not_rejected() {
        let q = three_by_three();
        let answer = q.validate(&json!({"1": 1, "2": 2})).unwrap();
        assert!(!q.is_correct(&answer));
    }

    #[test]
    fn drag_drop_swapped_slots_is_wrong() {
        let q = three_by_three();
        let answer = q.validate(&json!({"1": 1, "2": 3, "3": 2})).unwrap();
        assert!(!q.is_correct(&answer));
    }

    #[test]
    fn drag_drop_unknown_ids_are_invalid_input() {
        let q = three_by_three();
        assert!(matches!(q.validate(&json!({"9": 1})), Err(Error::InvalidInput(_))));
        assert!(matches!(q.validate(&json!({"1": 9})), Err(Error::InvalidInput(_))));
        assert!(matches!(q.validate(&json!("A")), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn drag_drop_keys_naming_the_same_item_are_invalid_input() {
        let q = three_by_three();
        let err = q.validate(&json!({"1": 1, " 1": 2})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("placed twice")));
        assert!(matches!(q.validate(&json!({"2": 2, "02": 3})), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn empty_mapping_is_accepted_and_wrong() {
        let q = three_by_three();
        let answer = q.validate(&json!({})).unwrap();
        assert!(!q.is_correct(&answer));
        assert_eq!(q.render(&answer), json!([]));
    }
}
