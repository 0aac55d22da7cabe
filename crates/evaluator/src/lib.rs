pub mod course;
pub mod metadata;
pub mod policy_file;

pub use course::{Course, CourseConfig, CourseItemError, GradingContext, TextbookRef};
pub use metadata::CourseMetadata;
