pub mod limited;
pub mod pager;
