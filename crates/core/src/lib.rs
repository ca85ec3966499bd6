#![forbid(unsafe_code)]

pub mod adapter;
pub mod catalog;
pub mod cmi;
pub mod datamodel;
pub mod deriver;
pub mod error;
pub mod events;
pub mod model;
pub mod sequencer;
pub mod time;

pub use adapter::{RteAdapter, RteSession, RteValue, Scorm12Adapter, Scorm2004Adapter, adapter_for};
pub use cmi::{CmiData, CmiStore};
pub use error::{CallKind, Error, RteError};
pub use time::Clock;
