// 前台状态与后台调度
//
// 模块结构:
// - event: 前台事件通道 (UiEvent, UiSender)
// - scheduler: 后台任务调度 (TaskScheduler)
// - controller: 会话协调器 (SessionController)

mod controller;
mod event;
mod scheduler;

pub use controller::SessionController;
pub use event::{UiEvent, UiReceiver, UiSender};
pub use scheduler::TaskScheduler;
