pub mod exam;
pub mod grading;
pub mod timeparse;
