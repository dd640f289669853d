//! Pointer-driven filter for an external DSP host
//!
//! [`mapper`] turns a pointer position into a [`mode::FilterDescriptor`];
//! [`sync::FilterSynchronizer`] decides which descriptors are worth writing and
//! renders them into the host's directive file via [`host::DspHost`].

pub mod directive;
pub mod host;
pub mod mapper;
pub mod mode;
pub mod sync;
pub mod worker;
