//! Testes do subsistema de memória.

mod pmm_test;
mod vmm_test;

/// Executa todas as suítes de memória.
pub fn run_mm_tests() {
    pmm_test::run_pmm_tests();
    vmm_test::run_vmm_tests();
}
