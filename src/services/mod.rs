pub mod answer_service;
pub mod answerable;
pub mod grading_service;
pub mod quota_service;
pub mod result_service;
pub mod sampler;
pub mod session_service;
pub mod time_guard;
