pub mod draft;
pub mod proposal;
