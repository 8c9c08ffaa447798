pub mod artifact;
pub mod check;
pub mod collect;
pub mod comments;
pub mod targets;
pub mod waiter;
