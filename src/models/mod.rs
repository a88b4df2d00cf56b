// 数据模型模块

pub mod settings;
pub mod sftp;

pub use settings::AppSettings;
