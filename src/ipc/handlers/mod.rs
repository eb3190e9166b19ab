pub mod core;
pub mod imports;
pub mod records;
pub mod scholarships;
