pub mod review;
pub mod run;
pub mod types;
