use easyexe_core::rules::RuleTable;
use easyexe_core::version;

#[test]
fn version_is_non_empty() {
    let v = version();
    assert!(!v.is_empty());
}

#[test]
fn builtin_rules_cover_both_runtimes() {
    use easyexe_core::model::RuntimeKind;

    let table = RuleTable::builtin().expect("builtin rules");
    assert!(table.rules().iter().any(|r| r.runtime == Some(RuntimeKind::DosEmulator)));
    assert!(table.rules().iter().any(|r| r.runtime == Some(RuntimeKind::WindowsLayer)));
    assert!(table.rules().iter().all(|r| !r.is_synthesized()));
}
