// OpenTerm - SSH 终端 + SFTP 文件传输客户端
// 会话与传输编排层

pub mod constants;
pub mod models;
pub mod services;
pub mod ssh;
pub mod state;

#[cfg(test)]
mod testing;
