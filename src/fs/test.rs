//! Testes da tabela de file descriptors.

use crate::fs::fd::{FileDescriptorTable, SEEK_CUR, SEEK_END, SEEK_SET};
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sys::Errno;
use crate::{kassert, kassert_eq};

const FS_TESTS: &[TestCase] = &[
    TestCase::new("fd_lseek_whence", test_lseek_whence),
    TestCase::new("fd_lseek_erros", test_lseek_errors),
];

/// Executa os testes de fs.
pub fn run_fs_tests() {
    run_test_suite("FS", FS_TESTS);
}

fn test_lseek_whence() -> TestResult {
    let mut table = FileDescriptorTable::new();
    let fd = table.open_node(1000, true);
    kassert!(fd >= 0);

    kassert_eq!(table.lseek(fd, 100, SEEK_SET), 100);
    kassert_eq!(table.lseek(fd, 50, SEEK_CUR), 150);
    kassert_eq!(table.lseek(fd, -50, SEEK_CUR), 100);
    kassert_eq!(table.lseek(fd, 0, SEEK_END), 1000);
    kassert_eq!(table.lseek(fd, -1000, SEEK_END), 0);

    kassert!(table.close(fd).is_ok());
    TestResult::Pass
}

fn test_lseek_errors() -> TestResult {
    let mut table = FileDescriptorTable::new();

    // fd inválido
    kassert_eq!(table.lseek(7, 0, SEEK_SET), Errno::EBADF.as_isize());
    kassert_eq!(table.lseek(-1, 0, SEEK_SET), Errno::EBADF.as_isize());

    let fd = table.open_node(10, true);
    // whence desconhecido
    kassert_eq!(table.lseek(fd, 0, 99), Errno::EINVAL.as_isize());
    // resultado negativo
    kassert_eq!(table.lseek(fd, -1, SEEK_SET), Errno::EINVAL.as_isize());

    // node sem seek
    let pipe_fd = table.open_node(0, false);
    kassert_eq!(table.lseek(pipe_fd, 0, SEEK_SET), Errno::ESPIPE.as_isize());

    // fd fechado volta a ser inválido
    kassert!(table.close(fd).is_ok());
    kassert_eq!(table.lseek(fd, 0, SEEK_SET), Errno::EBADF.as_isize());
    TestResult::Pass
}
