pub mod annotations;
pub mod apps;
pub mod goals;
pub mod parameters;
