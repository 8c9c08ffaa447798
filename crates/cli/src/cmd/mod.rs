pub mod collect;
pub mod comment;
pub mod run;
