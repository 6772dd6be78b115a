//! Dataset sources and the weighted mixture over them.

mod dataset;
mod hybrid;
mod reason_seg;
mod refer;
mod refer_seg;
mod sample;
mod sem_seg;
mod tumor;
mod utils;
mod val;
mod vqa;

pub use dataset::*;
pub use hybrid::*;
pub use reason_seg::*;
pub use refer::*;
pub use refer_seg::*;
pub use sample::*;
pub use sem_seg::*;
pub use tumor::*;
pub use utils::*;
pub use val::*;
pub use vqa::*;
