//! Testes do núcleo: símbolos e o funil de interrupções.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::core::interrupts::{self, InterruptHandler, TrapFrame};
use crate::core::symbols::{SymbolTable, UNKNOWN_SYMBOL};
use crate::kassert;
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};

const CORE_TESTS: &[TestCase] = &[
    TestCase::new("symbols_resolucao_floor", test_symbol_resolution),
    TestCase::new("symbols_insercao_ordenada", test_symbol_ordering),
    TestCase::new("interrupts_registro_unico", test_handler_uniqueness),
];

/// Executa os testes do núcleo (pré-tasking).
pub fn run_core_tests() {
    run_test_suite("Core", CORE_TESTS);
}

/// Executa os testes que dependem do tasking (chamados pela thread
/// principal do kernel).
pub fn run_tasking_tests() {
    crate::sched::test::run_manager_tests();
}

/// Tabela {0x1000:a, 0x1100:b, 0x1200:c}: floor lookup exato.
fn test_symbol_resolution() -> TestResult {
    let mut table = SymbolTable::new();
    table.add_symbol(0x1000, "a");
    table.add_symbol(0x1100, "b");
    table.add_symbol(0x1200, "c");

    kassert!(table.get_symbol_from_address(0x0) == UNKNOWN_SYMBOL);
    kassert!(table.get_symbol_from_address(0x1000) == "a");
    kassert!(table.get_symbol_from_address(0x10FF) == "a");
    kassert!(table.get_symbol_from_address(0x1100) == "b");
    kassert!(table.get_symbol_from_address(0xFFFF) == "c");
    TestResult::Pass
}

/// Inserção fora de ordem mantém a tabela ordenada.
fn test_symbol_ordering() -> TestResult {
    let mut table = SymbolTable::new();
    table.add_symbol(0x3000, "tres");
    table.add_symbol(0x1000, "um");
    table.add_symbol(0x2000, "dois");

    kassert!(table.get_symbol_from_address(0x1500) == "um");
    kassert!(table.get_symbol_from_address(0x2500) == "dois");
    kassert!(table.get_symbol_from_address(0x3500) == "tres");
    kassert!(table.len() == 3);
    TestResult::Pass
}

struct CountingHandler(AtomicU64);

impl InterruptHandler for CountingHandler {
    fn on_interrupt(&self, _frame: &mut TrapFrame) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

static FIRST_HANDLER: CountingHandler = CountingHandler(AtomicU64::new(0));
static SECOND_HANDLER: CountingHandler = CountingHandler(AtomicU64::new(0));

/// Dois handlers no vetor 42: o segundo registro é recusado e apenas o
/// primeiro recebe as invocações.
fn test_handler_uniqueness() -> TestResult {
    kassert!(interrupts::register(42, &FIRST_HANDLER));
    kassert!(!interrupts::register(42, &SECOND_HANDLER));

    // Despacho sintético do vetor 42
    let mut frame = TrapFrame {
        int_num: 42,
        ..TrapFrame::default()
    };
    interrupts::dispatch(&mut frame);

    kassert!(FIRST_HANDLER.0.load(Ordering::Relaxed) == 1);
    kassert!(SECOND_HANDLER.0.load(Ordering::Relaxed) == 0);

    interrupts::unregister(42);
    TestResult::Pass
}
