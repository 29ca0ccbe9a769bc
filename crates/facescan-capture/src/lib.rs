//! facescan-capture — Image sources and output for the facescan pipeline.
//!
//! V4L2 camera streaming, image folders as frame sources, and writing
//! annotated buffers (optionally with timestamped names).

pub mod camera;
pub mod folder;
pub mod frame;
pub mod save;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use folder::{list_images, load_image, load_image_within, shrink_to_width, FolderSource, SourceError};
pub use frame::FrameError;
pub use save::{save_buffer, save_timestamped, timestamped_path, SaveError};
