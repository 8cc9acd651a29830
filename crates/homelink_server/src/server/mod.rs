#![forbid(unsafe_code)]

pub mod correlator;
pub mod device_hub;
pub mod dispatcher;
pub mod notifier;
pub mod registry;
pub mod state;
pub mod store;
pub mod webhook;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod correlator_tests;

#[cfg(test)]
mod device_hub_tests;



#[cfg(test)]
mod store_tests;
