//! 阻塞设备调用的重试策略.
//!
//! 被信号打断 (`EINTR`) 或暂时无法完成 (`EAGAIN`) 的调用无条件重试,
//! 其他错误立即返回. 没有超时与取消.

use std::io;

use log::trace;

/// 错误是否属于可重试类别
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// 重复执行 `op` 直到成功或返回不可重试的错误
pub fn retry<T>(what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(err) if is_transient(&err) => {
                trace!("{what} 被中断, 重试: {err}");
            }
            result => return result,
        }
    }
}
