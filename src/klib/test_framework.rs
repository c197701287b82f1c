//! # Framework de Self-Tests do Kernel
//!
//! Fornece estruturas e macros para testes padronizados que rodam
//! dentro do próprio kernel durante o boot (feature `self_test`).

/// Resultado de um teste individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    /// Teste passou com sucesso.
    Pass,
    /// Teste falhou.
    Fail,
    /// Teste foi pulado (não aplicável no contexto atual).
    Skip,
}

/// Estrutura para um caso de teste.
pub struct TestCase {
    /// Nome do teste (para logging).
    pub name: &'static str,
    /// Função que executa o teste.
    pub func: fn() -> TestResult,
}

impl TestCase {
    /// Cria um novo caso de teste.
    pub const fn new(name: &'static str, func: fn() -> TestResult) -> Self {
        Self { name, func }
    }

    /// Executa o teste e retorna o resultado.
    pub fn run(&self) -> TestResult {
        let result = (self.func)();
        match result {
            TestResult::Pass => crate::klog!("\x1b[32m[PASS]\x1b[0m "),
            TestResult::Fail => crate::klog!("\x1b[1;31m[FAIL]\x1b[0m "),
            TestResult::Skip => crate::klog!("\x1b[1;33m[SKIP]\x1b[0m "),
        }
        crate::klog!(self.name);
        crate::knl!();
        result
    }
}

/// Executa uma suíte de testes.
///
/// Se algum teste falhar, o kernel entra em panic. Isso garante que o
/// boot só prossegue com todos os subsistemas validados.
pub fn run_test_suite(suite_name: &str, tests: &[TestCase]) {
    crate::klog!("\x1b[36m==== TEST SUITE: \x1b[0m");
    crate::klog!(suite_name);
    crate::knl!();

    let mut passed = 0usize;
    let mut skipped = 0usize;

    let mut i = 0;
    while i < tests.len() {
        let test = &tests[i];
        match test.run() {
            TestResult::Pass => passed += 1,
            TestResult::Fail => {
                crate::kerror!("SUITE FAILED");
                panic!("Test suite failed - kernel halted");
            }
            TestResult::Skip => skipped += 1,
        }
        i += 1;
    }

    crate::klog!("\x1b[32m==== SUITE PASSED: \x1b[0m");
    crate::klog!(suite_name);
    crate::klog!("  passed=", passed as u64);
    if skipped > 0 {
        crate::klog!("  skipped=", skipped as u64);
    }
    crate::knl!();
}

/// Asserção em testes: se a condição for falsa, loga e retorna Fail.
#[macro_export]
macro_rules! kassert {
    ($cond:expr) => {
        if !($cond) {
            $crate::klog!("ASSERTION FAILED: ");
            $crate::klog!(stringify!($cond));
            $crate::knl!();
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            $crate::klog!("ASSERTION FAILED: ");
            $crate::klog!($msg);
            $crate::knl!();
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
}

/// Asserção de igualdade.
#[macro_export]
macro_rules! kassert_eq {
    ($left:expr, $right:expr) => {
        let __kassert_eq_left = $left;
        let __kassert_eq_right = $right;
        if __kassert_eq_left != __kassert_eq_right {
            $crate::kerror!("ASSERTION FAILED: left != right");
            $crate::kerror!("  left  = ", __kassert_eq_left as u64);
            $crate::kerror!("  right = ", __kassert_eq_right as u64);
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
}
