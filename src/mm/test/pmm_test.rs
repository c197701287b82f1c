//! Testes do alocador físico (instância standalone sobre um mapa
//! sintético; o alocador global não é tocado).

use crate::core::handoff::{MemoryMapEntry, MemoryType};
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::mm::pmm::PhysicalAllocator;
use crate::mm::PAGE_SIZE;
use crate::{kassert, kassert_eq};

const PMM_TESTS: &[TestCase] = &[
    TestCase::new("pmm_init_contadores", test_init_counters),
    TestCase::new("pmm_request_free_roundtrip", test_request_free_roundtrip),
    TestCase::new("pmm_sem_dupla_alocacao", test_no_double_allocation),
    TestCase::new("pmm_request_pages_contiguo", test_request_pages_contiguous),
    TestCase::new("pmm_free_nulo_e_aviso", test_free_null),
];

/// Executa os testes do PMM.
pub fn run_pmm_tests() {
    run_test_suite("PMM", PMM_TESTS);
}

/// Região "física" sintética: 1 MiB alinhado a página (256 frames).
#[repr(C, align(4096))]
struct TestRegion([u8; 0x100000]);

static mut TEST_REGION: TestRegion = TestRegion([0; 0x100000]);

const REGION_PAGES: u64 = 0x100000 / PAGE_SIZE;

fn region_base() -> u64 {
    unsafe { core::ptr::addr_of!(TEST_REGION) as u64 }
}

fn make_allocator() -> PhysicalAllocator {
    let map = [MemoryMapEntry {
        base: region_base(),
        len: 0x100000,
        typ: MemoryType::Usable,
        _pad: 0,
    }];

    let mut pmm = PhysicalAllocator::new();
    pmm.init_from_map(&map, 0x100000);
    pmm
}

/// Depois do init: total = 256 páginas, free = 256 - páginas do bitmap,
/// reservado cobre pelo menos o primeiro 1 MiB.
fn test_init_counters() -> TestResult {
    let pmm = make_allocator();
    let (total, free, used, reserved) = pmm.counters();

    kassert_eq!(total / PAGE_SIZE, REGION_PAGES);
    // O bitmap mora dentro da região e sai do pool como "used"
    let bitmap_pages = used / PAGE_SIZE;
    kassert!(bitmap_pages >= 1);
    kassert_eq!(free / PAGE_SIZE, REGION_PAGES - bitmap_pages);
    kassert!(reserved / PAGE_SIZE >= 0x100);
    TestResult::Pass
}

/// Sequência request/free: a soma dos contadores se conserva e os
/// deltas batem com as operações.
fn test_request_free_roundtrip() -> TestResult {
    let mut pmm = make_allocator();
    let (_, free_before, used_before, reserved_before) = pmm.counters();
    let sum_before = free_before + used_before + reserved_before;

    let mut frames = [0u64; 4];
    let mut i = 0;
    while i < 4 {
        frames[i] = pmm.request_page();
        kassert!(frames[i] % PAGE_SIZE == 0);
        kassert!(frames[i] >= region_base());
        i += 1;
    }

    let (_, free_mid, used_mid, reserved_mid) = pmm.counters();
    kassert_eq!(free_mid, free_before - 4 * PAGE_SIZE);
    kassert_eq!(used_mid, used_before + 4 * PAGE_SIZE);
    kassert_eq!(free_mid + used_mid + reserved_mid, sum_before);

    let mut i = 0;
    while i < 4 {
        pmm.free_page(frames[i]);
        i += 1;
    }

    let (_, free_after, used_after, reserved_after) = pmm.counters();
    kassert_eq!(free_after, free_before);
    kassert_eq!(used_after, used_before);
    kassert_eq!(reserved_after, reserved_before);
    TestResult::Pass
}

/// Um frame alocado não volta a ser entregue antes do free (e o cursor
/// rebobina quando um frame abaixo dele é liberado).
fn test_no_double_allocation() -> TestResult {
    let mut pmm = make_allocator();

    let first = pmm.request_page();
    let second = pmm.request_page();
    kassert!(first != second);

    // Liberar o primeiro rebobina o cursor: próxima alocação o reusa
    pmm.free_page(first);
    let third = pmm.request_page();
    kassert_eq!(third, first);

    pmm.free_page(second);
    pmm.free_page(third);
    TestResult::Pass
}

/// request_pages devolve uma faixa contígua com todos os bits setados.
fn test_request_pages_contiguous() -> TestResult {
    let mut pmm = make_allocator();

    let single = pmm.request_page();
    let run = pmm.request_pages(8);
    kassert!(run % PAGE_SIZE == 0);
    kassert!(run != single);

    let (_, free_before, _, _) = pmm.counters();
    pmm.free_pages(run, 8);
    let (_, free_after, _, _) = pmm.counters();
    kassert_eq!(free_after, free_before + 8 * PAGE_SIZE);

    pmm.free_page(single);
    TestResult::Pass
}

/// free de endereço nulo é aviso, não crash, e não mexe em contador.
fn test_free_null() -> TestResult {
    let mut pmm = make_allocator();
    let before = pmm.counters();
    pmm.free_page(0);
    pmm.free_pages(0, 4);
    let after = pmm.counters();
    kassert!(before.1 == after.1 && before.2 == after.2 && before.3 == after.3);
    TestResult::Pass
}
