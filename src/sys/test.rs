//! Testes dos códigos de erro (ABI congelada).

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sys::error::strerror;
use crate::sys::Errno;
use crate::{kassert, kassert_eq};

const SYS_TESTS: &[TestCase] = &[
    TestCase::new("errno_valores_congelados", test_errno_values),
    TestCase::new("errno_strings", test_errno_strings),
    TestCase::new("errno_retorno_negativo", test_errno_as_isize),
];

/// Executa os testes de sys.
pub fn run_sys_tests() {
    run_test_suite("Sys", SYS_TESTS);
}

fn test_errno_values() -> TestResult {
    kassert_eq!(Errno::EPERM.as_i32(), 1);
    kassert_eq!(Errno::ENOENT.as_i32(), 2);
    kassert_eq!(Errno::EBADF.as_i32(), 9);
    kassert_eq!(Errno::ENOMEM.as_i32(), 12);
    kassert_eq!(Errno::EINVAL.as_i32(), 22);
    kassert_eq!(Errno::ESPIPE.as_i32(), 29);
    kassert_eq!(Errno::ENOSYS.as_i32(), 38);
    kassert_eq!(Errno::ENOTRECOVERABLE.as_i32(), 131);
    TestResult::Pass
}

fn test_errno_strings() -> TestResult {
    kassert!(strerror(0) == "Success");
    kassert!(strerror(1) == "Operation not permitted");
    kassert!(strerror(2) == "No such file or directory");
    kassert!(strerror(29) == "Illegal seek");
    kassert!(strerror(38) == "Function not implemented");
    kassert!(strerror(131) == "State not recoverable");
    kassert!(strerror(9999) == "Unknown error");
    // Valores negativos são normalizados
    kassert!(strerror(-22) == "Invalid argument");
    TestResult::Pass
}

fn test_errno_as_isize() -> TestResult {
    kassert_eq!(Errno::EPERM.as_isize(), -1isize);
    kassert_eq!(Errno::ENOSYS.as_isize(), -38isize);
    kassert!(Errno::EINVAL.as_isize() < 0);
    TestResult::Pass
}
