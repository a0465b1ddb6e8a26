pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod locator;
pub mod model;
pub mod paste;
pub mod planner;
pub mod settings;
pub mod sim;
pub mod status;
pub mod timer;
pub mod trace;
pub mod tracker;
pub mod tree;
