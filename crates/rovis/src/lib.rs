#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use rovis_image as image;

#[doc(inline)]
pub use rovis_imgproc as imgproc;

#[doc(inline)]
pub use rovis_3d as k3d;
