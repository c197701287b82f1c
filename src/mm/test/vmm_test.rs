//! Testes do VMM: map/unmap/check, fork e optimized_map_range.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::mm::vmm::{AddressSpace, MapSize, PtFlags};
use crate::{kassert, kassert_eq};

const VMM_TESTS: &[TestCase] = &[
    TestCase::new("vmm_map_check_unmap", test_map_check_unmap),
    TestCase::new("vmm_fork_snapshot", test_fork_snapshot),
    TestCase::new("vmm_optimized_fail_on_modulo", test_optimized_fail_on_modulo),
    TestCase::new("vmm_unmap_ausente_e_aviso", test_unmap_missing),
];

/// Executa os testes do VMM.
pub fn run_vmm_tests() {
    run_test_suite("VMM", VMM_TESTS);
}

/// map → check true → get_physical → unmap → check false.
fn test_map_check_unmap() -> TestResult {
    let space = AddressSpace::new();

    kassert!(!space.check(0x1000, PtFlags::P));

    space.map(0x1000, 0x2000, PtFlags::P | PtFlags::RW, MapSize::Size4K);
    kassert!(space.check(0x1000, PtFlags::P));
    kassert!(space.check(0x1000, PtFlags::RW));
    kassert_eq!(space.get_physical(0x1000).unwrap_or(0), 0x2000);

    space.unmap(0x1000, MapSize::Size4K);
    kassert!(!space.check(0x1000, PtFlags::P));
    TestResult::Pass
}

/// O filho enxerga os mapeamentos do pai no instante do fork; mudanças
/// posteriores no pai não aparecem no snapshot do filho.
fn test_fork_snapshot() -> TestResult {
    let parent = AddressSpace::new();
    parent.map(
        0x100000,
        0x300000,
        PtFlags::P | PtFlags::RW | PtFlags::US,
        MapSize::Size4K,
    );

    let child = parent.fork();
    kassert_eq!(child.get_physical(0x100000).unwrap_or(0), 0x300000);
    kassert!(child.check(0x100000, PtFlags::US));

    // Remap no pai depois do fork: o filho mantém o snapshot
    parent.remap(0x100000, 0x400000, PtFlags::P | PtFlags::RW | PtFlags::US);
    kassert_eq!(parent.get_physical(0x100000).unwrap_or(0), 0x400000);
    kassert_eq!(child.get_physical(0x100000).unwrap_or(0), 0x300000);

    // Mapeamento novo no pai tampouco aparece no filho
    parent.map(
        0x200000,
        0x500000,
        PtFlags::P | PtFlags::RW | PtFlags::US,
        MapSize::Size4K,
    );
    kassert!(!child.check(0x200000, PtFlags::P));
    TestResult::Pass
}

/// fail_on_modulo recusa comprimentos não múltiplos do tamanho escolhido.
fn test_optimized_fail_on_modulo() -> TestResult {
    let space = AddressSpace::new();

    // 2 MiB + 4 KiB: escolheria 2 MiB mas o resto não é múltiplo
    let result = space.optimized_map_range(
        0x4000_0000,
        0x4000_0000,
        crate::mm::PAGE_SIZE_2M + crate::mm::PAGE_SIZE,
        PtFlags::P | PtFlags::RW,
        false,
        true,
    );
    kassert!(result == MapSize::None);
    kassert!(!space.check(0x4000_0000, PtFlags::P));

    // Comprimento exato de 2 MiB passa
    let result = space.optimized_map_range(
        0x4000_0000,
        0x4000_0000,
        crate::mm::PAGE_SIZE_2M,
        PtFlags::P | PtFlags::RW,
        false,
        true,
    );
    kassert!(result == MapSize::Size2M);
    kassert!(space.check(0x4000_0000, PtFlags::P));
    TestResult::Pass
}

/// unmap de endereço não mapeado é aviso, não falha.
fn test_unmap_missing() -> TestResult {
    let space = AddressSpace::new();
    space.unmap(0xDEAD_000, MapSize::Size4K);
    kassert!(!space.check(0xDEAD_000, PtFlags::P));
    TestResult::Pass
}
