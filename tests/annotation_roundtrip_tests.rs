//! Inject/erase round trips over whole source trees and generated sources
//!
//! inject ∘ erase must be the identity on every file, erase must be
//! idempotent, and injecting twice must change nothing the second time.

use autoperf::annotation::{annotate, erase, inject, AnnotateMode, AnnotateOptions, CScanner, Selection, SourceParser};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CPP_SOURCE: &str = r#"#include <vector>
#define SQUARE(x) ((x) * (x))

namespace geometry {

struct Point {
    int x = 0, y = 0;
    int norm() const { return SQUARE(x) + SQUARE(y); }
};

template <typename T>
T clamp(T v, T lo, T hi)
{
    if (v < lo) return lo;
    if (v > hi) return hi;
    return v;
}

} // namespace geometry

static const char *banner = "return { not code }";

int geometry_total(const std::vector<geometry::Point> &pts)
{
    int sum = 0;
    for (const auto &p : pts) {
        auto twice = [](int n) { return n * 2; };
        sum += twice(p.norm());
    }
    return sum;
}
"#;

const HEADER: &str = "#pragma once\nstatic inline int id(int v) { return v; }\nint decl_only(int);\n";

const BROKEN: &str = "int broken(void) {\n#ifdef X\n    if (1) {\n#endif\n    return 0;\n}\n";

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walk(root)
        .into_iter()
        .map(|path| {
            let bytes = fs::read(&path).unwrap();
            (path, bytes)
        })
        .collect()
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}

fn tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("src/detail")).unwrap();
    fs::write(root.join("src/geometry.cpp"), CPP_SOURCE).unwrap();
    fs::write(root.join("src/detail/id.h"), HEADER).unwrap();
    fs::write(root.join("src/broken.c"), BROKEN).unwrap();
    fs::write(root.join("main.c"), "int main(void)\n{\n    return 0;\n}\n").unwrap();
    fs::write(root.join("README.md"), "int not_c(void) { return 1; }\n").unwrap();
    tmp
}

#[test]
fn test_tree_round_trip() {
    let tmp = tree();
    let root = tmp.path();
    let before = snapshot(root);

    let inject_opts = AnnotateOptions::new(vec![root.to_path_buf()], AnnotateMode::Inject).recursive(true);
    let summary = annotate(root, &inject_opts, &CScanner).unwrap();
    assert_eq!(summary.parse_failures().count(), 1);
    assert_eq!(summary.modified_files(), 3);
    assert!(fs::read_to_string(root.join("src/geometry.cpp"))
        .unwrap()
        .contains("AUTOPERF_PROBE_START(\"clamp\");"));
    assert_eq!(fs::read(root.join("README.md")).unwrap(), before[&root.join("README.md")]);

    // second injection is a no-op
    let again = annotate(root, &inject_opts, &CScanner).unwrap();
    assert_eq!(again.markers(), 0);

    let erase_opts = AnnotateOptions::new(vec![root.to_path_buf()], AnnotateMode::Erase).recursive(true);
    let erased = annotate(root, &erase_opts, &CScanner).unwrap();
    assert_eq!(erased.markers(), summary.markers());
    assert_eq!(snapshot(root), before);

    let noop = annotate(root, &erase_opts, &CScanner).unwrap();
    assert_eq!(noop.markers(), 0);
    assert_eq!(snapshot(root), before);
}

#[test]
fn test_non_recursive_only_touches_top_level() {
    let tmp = tree();
    let root = tmp.path();
    let opts = AnnotateOptions::new(vec![root.to_path_buf()], AnnotateMode::Inject).workers(1);
    let summary = annotate(root, &opts, &CScanner).unwrap();
    let touched: Vec<String> = summary
        .files
        .iter()
        .filter(|f| f.modified())
        .map(|f| f.path.display().to_string())
        .collect();
    assert_eq!(touched, vec!["main.c"]);
}

fn statement() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("x += 1;".to_string()),
        Just("if (x > 3) return x;".to_string()),
        Just("if (x) { return -x; }".to_string()),
        Just("/* return { */".to_string()),
        Just("// } return\n".to_string()),
        Just("s = \"}{ return;\";".to_string()),
        Just("c = '}';".to_string()),
        Just("while (x--) { y = x; }".to_string()),
        Just("return;".to_string()),
        "[a-z]{1,6}".prop_map(|name| format!("{}();", name)),
    ]
}

fn function() -> impl Strategy<Value = String> {
    ("fn_[a-z0-9_]{0,8}", prop::collection::vec(statement(), 0..6), any::<bool>()).prop_map(
        |(name, body, newline_brace)| {
            let open = if newline_brace { "\n{" } else { " {" };
            format!("static int {}(int x){}\n    {}\n}}\n", name, open, body.join("\n    "))
        },
    )
}

fn source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            3 => function(),
            1 => Just("int global = 3;\n".to_string()),
            1 => Just("#define WRAP(x) { x }\n".to_string()),
            1 => Just("struct S { int a; };\n".to_string()),
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_inject_then_erase_is_identity(src in source()) {
        let bytes = src.as_bytes();
        let functions = CScanner.parse(bytes).unwrap();
        let (injected, journal) = inject(bytes, &functions, &Selection::All);
        prop_assert_eq!(journal.is_empty(), functions.is_empty());

        let (restored, removed) = erase(&injected);
        prop_assert_eq!(restored.as_slice(), bytes);
        prop_assert_eq!(removed.len(), journal.len());
    }

    #[test]
    fn prop_erase_is_idempotent(src in source()) {
        let bytes = src.as_bytes();
        let functions = CScanner.parse(bytes).unwrap();
        let (injected, _) = inject(bytes, &functions, &Selection::All);
        let (once, _) = erase(&injected);
        let (twice, removed) = erase(&once);
        prop_assert_eq!(once, twice);
        prop_assert!(removed.is_empty());
    }

    #[test]
    fn prop_inject_twice_is_noop(src in source()) {
        let bytes = src.as_bytes();
        let functions = CScanner.parse(bytes).unwrap();
        let (first, _) = inject(bytes, &functions, &Selection::All);
        let reparsed = CScanner.parse(&first).unwrap();
        let (second, journal) = inject(&first, &reparsed, &Selection::All);
        prop_assert!(journal.is_empty());
        prop_assert_eq!(first, second);
    }
}
