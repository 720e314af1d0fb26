pub mod comparator;
pub mod generic_key;
