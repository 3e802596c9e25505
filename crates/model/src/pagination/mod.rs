pub mod cursor;
pub mod descriptor;
pub mod page;
