pub mod admit;
pub mod evaluate;
pub mod profile;
pub mod query;
