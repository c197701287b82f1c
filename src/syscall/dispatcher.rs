//! Dispatcher central de syscalls.
//!
//! Chamado pela entrada assembly com o `SysFrm` completo. O número vem
//! em RAX; o retorno volta em RAX. Erros são inteiros pequenos negativos
//! e são espelhados no slot de errno da thread.

use super::numbers::*;
use super::SysFrm;
use crate::sys::Errno;

/// Ponto de entrada Rust das syscalls (símbolo consumido pelo assembly).
#[no_mangle]
pub extern "C" fn syscall_handler(frame: *mut SysFrm) -> u64 {
    // SAFETY: a entrada assembly garante um SysFrm completo e exclusivo
    // na stack de syscall da thread.
    let frame = unsafe { &mut *frame };

    let result: isize = match frame.rax {
        SYS_LSEEK => super::fs::sys_lseek(frame),
        SYS_SLEEP => super::process::sys_sleep(frame),
        SYS_FORK => super::process::sys_fork(frame),
        SYS_EXIT => super::process::sys_exit(frame),
        number => {
            crate::kwarn!("(Syscall) Syscall nao implementada=", number);
            Errno::ENOSYS.as_isize()
        }
    };

    // Canal de errno: retornos negativos espelham o erro na thread
    if result < 0 {
        crate::sched::set_current_errno((-result) as i32);
    }

    result as u64
}
