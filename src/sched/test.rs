//! Testes de tasking.
//!
//! `run_sched_tests` roda antes do tasking subir (só estruturas);
//! `run_manager_tests` roda na thread principal do kernel, com o
//! TaskManager vivo.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sched::task::{TaskName, TaskSecurity, TaskState, TrustLevel, TASK_NAME_LEN};
use crate::sys::types::Upid;
use crate::{kassert, kassert_eq};

const SCHED_TESTS: &[TestCase] = &[
    TestCase::new("task_nome_trunca", test_name_truncation),
    TestCase::new("task_token_unico", test_unique_tokens),
];

const MANAGER_TESTS: &[TestCase] = &[
    TestCase::new("manager_cria_processo_e_thread", test_create_process_thread),
    TestCase::new("manager_kill_e_reap", test_kill_and_reap),
];

/// Testes de estruturas (pré-tasking).
pub fn run_sched_tests() {
    run_test_suite("Sched", SCHED_TESTS);
}

/// Testes com o TaskManager vivo.
pub fn run_manager_tests() {
    run_test_suite("TaskManager", MANAGER_TESTS);
}

static LONG_NAME: [u8; 512] = [b'x'; 512];

fn test_name_truncation() -> TestResult {
    let mut name = TaskName::new("processo");
    kassert!(name.as_str() == "processo");

    // Rename copia até a capacidade do buffer
    let long = core::str::from_utf8(&LONG_NAME).unwrap_or("x");
    name.set(long);
    kassert_eq!(name.as_str().len(), TASK_NAME_LEN);
    TestResult::Pass
}

fn test_unique_tokens() -> TestResult {
    let a = TaskSecurity::new(TrustLevel::User);
    let b = TaskSecurity::new(TrustLevel::User);
    kassert!(a.unique_token != b.unique_token);
    kassert!(a.trust_level == TrustLevel::User);
    TestResult::Pass
}

fn test_create_process_thread() -> TestResult {
    let Some(manager) = crate::sched::manager() else {
        return TestResult::Skip;
    };

    let pid = manager.create_process(Upid::NONE, "selftest", TrustLevel::System);

    // Thread criada Stopped para o scheduler não a escolher
    let tid = manager.create_thread_with_state(pid, 0, 0, 0, 0, TaskState::Stopped);
    kassert!(tid.is_some());
    let tid = tid.unwrap_or(crate::sys::types::Utid::NONE);

    {
        let mut set = manager.set.lock_critical("test_create_process_thread");
        let thread = set.thread_mut(tid);
        kassert!(thread.is_some());
        if let Some(thread) = thread {
            kassert!(thread.state == TaskState::Stopped);
            kassert!(thread.parent == pid);
            // Threads System têm user stack lazy e kernel stack eager
            kassert!(thread.user_stack.is_some());
            kassert!(thread.kernel_stack.top() != 0);
        }
    }

    manager.kill_process(pid, 0);
    manager.reap();
    TestResult::Pass
}

fn test_kill_and_reap() -> TestResult {
    let Some(manager) = crate::sched::manager() else {
        return TestResult::Skip;
    };

    let pid = manager.create_process(Upid::NONE, "morituro", TrustLevel::System);
    let tid = manager
        .create_thread_with_state(pid, 0, 0, 0, 0, TaskState::Stopped)
        .unwrap_or(crate::sys::types::Utid::NONE);

    manager.kill_thread(tid, -7);
    {
        let mut set = manager.set.lock_critical("test_kill_and_reap");
        if let Some(thread) = set.thread_mut(tid) {
            kassert!(thread.state == TaskState::Terminated);
            kassert_eq!(thread.exit_code, -7);
        } else {
            return TestResult::Fail;
        }
    }

    manager.kill_process(pid, -7);
    manager.reap();

    {
        let mut set = manager.set.lock_critical("test_kill_and_reap_apos");
        kassert!(set.thread_mut(tid).is_none());
        kassert!(set.find_process(pid).is_none());
    }
    TestResult::Pass
}
