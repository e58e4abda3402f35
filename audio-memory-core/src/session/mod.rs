pub mod controller;
pub(crate) mod dispatcher;
pub mod extraction;
pub mod scheduler;
pub(crate) mod worker;
