pub mod camera;
pub mod sampler;

pub use camera::{CameraSource, OpenCvCamera, OpenCvStream, VideoStream};
pub use sampler::{EncodedFrame, FrameSampler};
