pub mod charts;
pub mod classes;
pub mod core;
pub mod groups;
pub mod randomize;
pub mod seating;
pub mod students;
