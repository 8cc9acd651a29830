#![forbid(unsafe_code)]

pub mod frames;

pub use frames::{
	DEFAULT_MAX_FRAME_SIZE, DeviceCommand, DeviceEvent, FrameError, TvStatusEntry, decode_command, decode_event,
	encode_command, encode_event,
};
