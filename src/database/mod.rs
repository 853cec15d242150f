pub mod memory;
pub mod pool;
pub mod question_catalog;
pub mod session_store;

pub use question_catalog::{PgQuestionCatalog, QuestionCatalog};
pub use session_store::{AnswerRemoval, NewAnswer, PgSessionStore, SessionStore};
