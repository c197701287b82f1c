//! Syscalls de arquivo.

use super::SysFrm;
use crate::sys::types::Off;
use crate::sys::Errno;

/// lseek(fd, offset, whence): delega para a tabela de descriptors do
/// processo e retorna o resultado dela diretamente.
pub fn sys_lseek(frame: &SysFrm) -> isize {
    let fd = frame.rdi as i32;
    let offset = frame.rsi as Off;
    let whence = frame.rdx as i32;

    let pid = crate::sched::current_process_id();
    let Some(manager) = crate::sched::manager() else {
        return Errno::ESRCH.as_isize();
    };

    let mut set = manager.set.lock_critical("sys_lseek");
    match set.find_process_mut(pid) {
        Some(process) => process.fd_table.lseek(fd, offset, whence),
        None => Errno::ESRCH.as_isize(),
    }
}
