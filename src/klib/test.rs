//! Testes dos utilitários internos.

use crate::klib::align::{align_down, align_up, to_pages};
use crate::klib::bitmap::Bitmap;
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::{kassert, kassert_eq};

const KLIB_TESTS: &[TestCase] = &[
    TestCase::new("bitmap_set_get", test_bitmap_set_get),
    TestCase::new("bitmap_set_reports_flip", test_bitmap_set_reports_flip),
    TestCase::new("align_helpers", test_align_helpers),
];

/// Executa todos os testes de klib.
pub fn run_klib_tests() {
    run_test_suite("Klib", KLIB_TESTS);
}

static mut BITMAP_BUF: [u8; 16] = [0; 16];

fn test_bitmap_set_get() -> TestResult {
    let mut bm = unsafe { Bitmap::from_raw(core::ptr::addr_of_mut!(BITMAP_BUF) as *mut u8, 16) };
    bm.clear();

    kassert!(!bm.get(5));
    bm.set(5, true);
    kassert!(bm.get(5));
    kassert!(!bm.get(4));
    kassert!(!bm.get(6));

    bm.set(5, false);
    kassert!(!bm.get(5));

    // Fora do intervalo: leitura falsa, escrita ignorada
    kassert!(!bm.get(1000));
    kassert!(!bm.set(1000, true));
    TestResult::Pass
}

fn test_bitmap_set_reports_flip() -> TestResult {
    let mut bm = unsafe { Bitmap::from_raw(core::ptr::addr_of_mut!(BITMAP_BUF) as *mut u8, 16) };
    bm.clear();

    kassert!(bm.set(7, true));
    // Segundo set idêntico não flipa
    kassert!(!bm.set(7, true));
    kassert!(bm.set(7, false));
    kassert!(!bm.set(7, false));
    TestResult::Pass
}

fn test_align_helpers() -> TestResult {
    kassert_eq!(align_up(0x1001, 0x1000), 0x2000);
    kassert_eq!(align_up(0x1000, 0x1000), 0x1000);
    kassert_eq!(align_down(0x1FFF, 0x1000), 0x1000);
    kassert_eq!(to_pages(1), 1);
    kassert_eq!(to_pages(0x1000), 1);
    kassert_eq!(to_pages(0x1001), 2);
    TestResult::Pass
}
