pub mod distance;
pub mod fare;
pub mod lifecycle;
pub mod matching;
pub mod position;
pub mod sales;
