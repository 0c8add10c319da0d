pub mod count;
pub mod health;
pub mod stream;
pub mod visit;
