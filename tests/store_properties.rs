//! Cross-module property and scenario tests for the streaming record store.

use std::io::Write;

use filterlog_store::{Condition, Connective, Operator, Predicate, Record, StoreConfig, VirtualStore};
use tempfile::NamedTempFile;

fn filterlog_line(action: &str, proto: &str, src: &str, srcport: &str) -> String {
    format!(
        "2024-01-15T10:30:45 host filterlog: 0,0,,00000000000000000000000000000000,em0,match,{action},in,4,0x0,64,1,0,none,6,{proto},60,{src},10.0.0.2,{srcport},80,0,S,0,0,0,"
    )
}

fn write_lines(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn small_config() -> StoreConfig {
    StoreConfig { chunk_size: 4, cache_chunks: 3, worker_count: 2, ..StoreConfig::default() }
}

#[test]
fn record_count_is_stable_across_repeated_loads() {
    let lines: Vec<String> = (0..37).map(|_| filterlog_line("pass", "tcp", "10.0.0.1", "1000")).collect();
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    let first_total = store.total();

    store.load(file.path(), None, None).unwrap();
    let second_total = store.total();

    assert_eq!(first_total, second_total);
    assert_eq!(first_total, 37);
}

#[test]
fn range_additivity_holds_across_chunk_boundaries() {
    let lines: Vec<String> = (0..20).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).collect();
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();

    let (a, b, c) = (2u64, 11u64, 17u64);
    let first = store.get(a, b - a).unwrap();
    let second = store.get(b, c - b).unwrap();
    let combined = store.get(a, c - a).unwrap();

    let mut concatenated = first;
    concatenated.extend(second);
    assert_eq!(digests(&concatenated), digests(&combined));
}

fn digests(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.digest.clone()).collect()
}

#[test]
fn sorted_matches_are_strictly_increasing_and_in_bounds() {
    let mut lines = Vec::new();
    for i in 0..30 {
        let action = if i % 3 == 0 { "pass" } else { "block" };
        lines.push(filterlog_line(action, "tcp", "10.0.0.1", "1000"));
    }
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    let total = store.total();

    let predicate = Predicate::new(
        vec![Condition::new("action", Operator::Eq, "pass", true).unwrap()],
        Vec::new(),
        None,
    );
    store.apply_filter(&predicate, None, None).unwrap();

    // Re-derive the raw match list by re-running the same filter through a
    // second store instance and comparing against strictly-increasing order
    // indirectly: total() must be <= total records, and get() must never
    // fail for the full filtered range.
    let filtered_total = store.total();
    assert!(filtered_total <= total);
    let all = store.get(0, filtered_total).unwrap();
    assert_eq!(all.len(), filtered_total as usize);
    for record in &all {
        assert_eq!(record.field("action"), "pass");
    }
}

#[test]
fn filter_determinism_is_independent_of_worker_count() {
    let lines: Vec<String> = (0..50)
        .map(|i| {
            let action = if i % 2 == 0 { "pass" } else { "block" };
            filterlog_line(action, "tcp", "10.0.0.1", "1000")
        })
        .collect();
    let file = write_lines(&lines);

    let predicate = Predicate::new(
        vec![Condition::new("action", Operator::Eq, "pass", true).unwrap()],
        Vec::new(),
        None,
    );

    let mut single = VirtualStore::new(StoreConfig { chunk_size: 4, worker_count: 1, ..StoreConfig::default() });
    single.load(file.path(), None, None).unwrap();
    single.apply_filter(&predicate, None, None).unwrap();

    let mut multi = VirtualStore::new(StoreConfig { chunk_size: 4, worker_count: 6, ..StoreConfig::default() });
    multi.load(file.path(), None, None).unwrap();
    multi.apply_filter(&predicate, None, None).unwrap();

    assert_eq!(single.total(), multi.total());
    let single_records = single.get(0, single.total()).unwrap();
    let multi_records = multi.get(0, multi.total()).unwrap();
    assert_eq!(digests(&single_records), digests(&multi_records));
}

#[test]
fn non_record_lines_do_not_shift_surrounding_record_indices() {
    let clean_lines: Vec<String> = (0..10).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).collect();
    let clean_file = write_lines(&clean_lines);

    let mut noisy_lines = Vec::new();
    for (i, line) in clean_lines.iter().enumerate() {
        noisy_lines.push(line.clone());
        if i % 3 == 0 {
            noisy_lines.push(String::new());
            noisy_lines.push("-- log rotated --".to_string());
        }
    }
    let noisy_file = write_lines(&noisy_lines);

    let mut clean_store = VirtualStore::new(small_config());
    clean_store.load(clean_file.path(), None, None).unwrap();
    let mut noisy_store = VirtualStore::new(small_config());
    noisy_store.load(noisy_file.path(), None, None).unwrap();

    assert_eq!(clean_store.total(), noisy_store.total());
    let clean_records = clean_store.get(0, clean_store.total()).unwrap();
    let noisy_records = noisy_store.get(0, noisy_store.total()).unwrap();
    for (clean, noisy) in clean_records.iter().zip(noisy_records.iter()) {
        assert_eq!(clean.field("srcport"), noisy.field("srcport"));
    }
}

#[test]
fn cache_is_transparent_regardless_of_warm_state() {
    let lines: Vec<String> = (0..40).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).collect();
    let file = write_lines(&lines);

    let mut cold_store = VirtualStore::new(StoreConfig { chunk_size: 4, cache_chunks: 1, ..StoreConfig::default() });
    cold_store.load(file.path(), None, None).unwrap();
    let cold = digests(&cold_store.get(5, 20).unwrap());

    let mut warm_store = VirtualStore::new(StoreConfig { chunk_size: 4, cache_chunks: 100, ..StoreConfig::default() });
    warm_store.load(file.path(), None, None).unwrap();
    let _ = warm_store.get(0, 40).unwrap(); // pre-warm every chunk
    let warm = digests(&warm_store.get(5, 20).unwrap());

    assert_eq!(cold, warm);
}

#[test]
fn tail_matches_get_over_the_trailing_window() {
    let lines: Vec<String> = (0..15).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).collect();
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();

    let total = store.total();
    let n = 5u64;
    let tail = store.tail(n as usize).unwrap();
    let tail_via_get = store.get(total - n, n).unwrap();

    assert_eq!(digests(&tail), digests(&tail_via_get));
}

#[test]
fn interface_or_fold_matches_physical_or_display_name() {
    struct FixedResolver;
    impl filterlog_store::InterfaceResolver for FixedResolver {
        fn resolve(&self, physical: &str) -> Option<String> {
            (physical == "em0").then(|| "LAN".to_string())
        }
    }

    let file = write_lines(&[filterlog_line("pass", "tcp", "10.0.0.1", "1000")]);
    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    store.set_interface_resolver(Some(std::sync::Arc::new(FixedResolver)));

    let by_physical = Predicate::new(vec![Condition::new("interface", Operator::Eq, "em0", true).unwrap()], Vec::new(), None);
    let by_display = Predicate::new(vec![Condition::new("interface", Operator::Eq, "LAN", true).unwrap()], Vec::new(), None);

    store.apply_filter(&by_physical, None, None).unwrap();
    assert_eq!(store.total(), 1);

    store.clear_filter();
    store.apply_filter(&by_display, None, None).unwrap();
    assert_eq!(store.total(), 1);
}

#[test]
fn resolver_hot_swap_is_reflected_on_next_get_only() {
    struct LanResolver;
    impl filterlog_store::InterfaceResolver for LanResolver {
        fn resolve(&self, _physical: &str) -> Option<String> {
            Some("LAN".to_string())
        }
    }
    struct WanResolver;
    impl filterlog_store::InterfaceResolver for WanResolver {
        fn resolve(&self, _physical: &str) -> Option<String> {
            Some("WAN".to_string())
        }
    }

    let file = write_lines(&[filterlog_line("pass", "tcp", "10.0.0.1", "1000")]);
    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();

    store.set_interface_resolver(Some(std::sync::Arc::new(LanResolver)));
    let before = store.get(0, 1).unwrap();
    assert_eq!(before[0].field("interface_display"), "LAN");

    store.set_interface_resolver(Some(std::sync::Arc::new(WanResolver)));
    let after = store.get(0, 1).unwrap();
    assert_eq!(after[0].field("interface_display"), "WAN");
    // The earlier snapshot is untouched by the swap.
    assert_eq!(before[0].field("interface_display"), "LAN");
}

#[test]
fn scenario_minimal_accept_decodes_expected_fields() {
    let file = write_lines(&[filterlog_line("pass", "tcp", "10.0.0.1", "1000")]);
    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    let records = store.get(0, 1).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("action"), "pass");
    assert_eq!(records[0].field("protoname"), "tcp");
    assert_eq!(records[0].field("src"), "10.0.0.1");
    assert_eq!(records[0].field("srcport"), "1000");
}

#[test]
fn scenario_reject_does_not_advance_record_counter() {
    let mut lines = vec![filterlog_line("pass", "tcp", "10.0.0.1", "1000")];
    lines.push("2024-01-15T10:30:45 host sshd: accepted password for root".to_string());
    lines.push(filterlog_line("pass", "tcp", "10.0.0.2", "2000"));
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    assert_eq!(store.total(), 2);
}

#[test]
fn scenario_filter_and_returns_exact_match_count() {
    let mut lines = Vec::new();
    for _ in 0..5 {
        lines.push(filterlog_line("pass", "tcp", "10.0.0.1", "1000"));
    }
    for _ in 0..3 {
        lines.push(filterlog_line("block", "tcp", "10.0.0.1", "1000"));
    }
    for _ in 0..2 {
        lines.push(filterlog_line("pass", "udp", "10.0.0.1", "1000"));
    }
    let file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();

    let predicate = Predicate::new(
        vec![
            Condition::new("action", Operator::Eq, "pass", true).unwrap(),
            Condition::new("protoname", Operator::Eq, "tcp", true).unwrap(),
        ],
        vec![Connective::And],
        None,
    );
    store.apply_filter(&predicate, None, None).unwrap();
    assert_eq!(store.total(), 5);
}

#[test]
fn scenario_regex_filter_matches_minimal_accept() {
    let file = write_lines(&[filterlog_line("pass", "tcp", "10.0.0.1", "1000")]);
    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();

    let predicate = Predicate::new(
        vec![Condition::new("src", Operator::Regex, r"^10\.", true).unwrap()],
        Vec::new(),
        None,
    );
    store.apply_filter(&predicate, None, None).unwrap();
    assert_eq!(store.total(), 1);
}

#[test]
fn scenario_tail_reflects_appended_records_after_reload() {
    let mut lines: Vec<String> = (0..5).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).collect();
    let mut file = write_lines(&lines);

    let mut store = VirtualStore::new(small_config());
    store.load(file.path(), None, None).unwrap();
    let before = digests(&store.tail(5).unwrap());

    for i in 5..12 {
        writeln!(file, "{}", filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())).unwrap();
    }
    file.flush().unwrap();
    lines.extend((5..12).map(|i| filterlog_line("pass", "tcp", "10.0.0.1", &i.to_string())));

    store.load(file.path(), None, None).unwrap();
    let after = digests(&store.tail(5).unwrap());

    assert_ne!(before, after);
    let last_five: Vec<String> = lines[lines.len() - 5..].to_vec();
    let expected_ports: Vec<&str> = last_five.iter().map(|l| l.split(',').nth(20).unwrap()).collect();
    let actual_records = store.tail(5).unwrap();
    let actual_ports: Vec<&str> = actual_records.iter().map(|r| r.field("srcport")).collect();
    assert_eq!(expected_ports, actual_ports);
}
