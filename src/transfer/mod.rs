// 传输模块入口
pub mod progress;
pub mod upload;

pub use upload::copy_files;
