pub mod complete;
pub mod list;
pub mod run;
pub mod summon;
pub mod version;
