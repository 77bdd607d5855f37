//! Parsing of `git diff --unified=0` output into HunkMaps

use crate::hunkmap::HunkMap;
use regex::Regex;
use std::sync::OnceLock;

fn hunk_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,\d+)? \+(\d+)(?:,\d+)? @@")
            .unwrap_or_else(|e| unreachable!("hunk header pattern is static: {}", e))
    })
}

/// Strip the `a/` / `b/` prefix and git's C-style quoting from a file header
fn header_path(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.trim_end();
    if raw == "/dev/null" {
        return None;
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .map(|r| r.replace("\\\"", "\"").replace("\\\\", "\\"))
        .unwrap_or_else(|| raw.to_string());
    Some(unquoted.strip_prefix(prefix).map(str::to_string).unwrap_or(unquoted))
}

/// Build the (base, head) HunkMaps from unified-zero diff text
///
/// Each hunk contributes its base start line under the base file path and
/// its head start line under the head file path.
pub fn parse_unified_zero(diff: &str) -> (HunkMap, HunkMap) {
    let mut base = HunkMap::new();
    let mut head = HunkMap::new();
    let mut base_file: Option<String> = None;
    let mut head_file: Option<String> = None;
    // `---`/`+++` only name files between a `diff` line and its first hunk
    let mut in_header = false;

    for line in diff.lines() {
        if line.starts_with("diff ") {
            base_file = None;
            head_file = None;
            in_header = true;
        } else if let (true, Some(rest)) = (in_header, line.strip_prefix("--- ")) {
            base_file = header_path(rest, "a/");
        } else if let (true, Some(rest)) = (in_header, line.strip_prefix("+++ ")) {
            head_file = header_path(rest, "b/");
        } else if let Some(caps) = hunk_header().captures(line) {
            in_header = false;
            let parse = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<usize>().ok());
            if let (Some(file), Some(start)) = (&base_file, parse(1)) {
                base.insert(file.clone(), start);
            }
            if let (Some(file), Some(start)) = (&head_file, parse(2)) {
                head.insert(file.clone(), start);
            }
        }
    }
    (base, head)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "\
diff --git a/src/a.c b/src/a.c
index 3b18e51..a9c3f2d 100644
--- a/src/a.c
+++ b/src/a.c
@@ -3 +3 @@ int f(int x) {
-    return x;
+    return x * 2;
@@ -10,0 +11,2 @@ int g(void) {
+    int y = 0;
+    y++;
@@ -20,3 +22 @@ int h(void) {
-    a();
-    b();
-    c();
+    abc();
diff --git a/lib/util.h b/lib/util.h
index 1111111..2222222 100644
--- a/lib/util.h
+++ b/lib/util.h
@@ -7,2 +7,2 @@
-int old(void);
-int older(void);
+int new(void);
+int newer(void);
";

    #[test]
    fn test_hunk_starts_per_side() {
        let (base, head) = parse_unified_zero(DIFF);
        assert_eq!(base.lines("src/a.c"), Some(&[3, 10, 20][..]));
        assert_eq!(head.lines("src/a.c"), Some(&[3, 11, 22][..]));
        assert_eq!(base.lines("lib/util.h"), Some(&[7][..]));
        assert_eq!(head.lines("lib/util.h"), Some(&[7][..]));
    }

    #[test]
    fn test_content_lines_resembling_headers_are_ignored() {
        // a removed line whose text starts with "-- " shows up as "--- "
        let diff = "diff --git a/x.c b/x.c\n--- a/x.c\n+++ b/x.c\n@@ -5 +5 @@\n--- decrement\n+++ increment\n@@ -9 +9 @@\n";
        let (base, head) = parse_unified_zero(diff);
        assert_eq!(base.lines("x.c"), Some(&[5, 9][..]));
        assert_eq!(head.lines("x.c"), Some(&[5, 9][..]));
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn test_quoted_paths() {
        let diff = "diff --git \"a/with space.c\" \"b/with space.c\"\n--- \"a/with space.c\"\n+++ \"b/with space.c\"\n@@ -1 +1 @@\n";
        let (base, _) = parse_unified_zero(diff);
        assert!(base.contains_file("with space.c"));
    }

    #[test]
    fn test_empty_diff() {
        let (base, head) = parse_unified_zero("");
        assert!(base.is_empty());
        assert!(head.is_empty());
    }
}
