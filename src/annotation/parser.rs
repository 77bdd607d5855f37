//! Lightweight C/C++ function scanner
//!
//! This is not a compiler front-end. It tokenizes the source (dropping
//! comments, literals and preprocessor lines), pairs every bracket, and then
//! walks declaration scopes (file, `namespace`, `extern "C"`, class bodies)
//! looking for `name(params) qualifiers {` shapes. Initializer and enum
//! braces are skipped whole. Inside a body, `return` statements are collected
//! except those belonging to lambdas or local classes.
//!
//! Sources whose brackets do not balance after preprocessing lines are
//! dropped (for example `#ifdef` branches that each open a brace) are
//! reported as a [`ParseError`] so the caller can skip the file.

use super::{FunctionRecord, ParseError, ReturnSite, SourceParser};

/// Identifiers that look like calls but never name a function definition
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "sizeof", "alignof", "do", "else",
    "case", "new", "delete", "static_assert", "_Static_assert", "typeid", "co_return",
];

/// Keywords whose parenthesized argument is part of a declaration, not its parameter list
const ATTRIBUTE_KEYWORDS: &[&str] = &[
    "__attribute__", "__attribute", "__declspec", "alignas", "_Alignas", "decltype", "__typeof__",
    "typeof", "asm", "__asm", "__asm__", "noexcept", "throw", "explicit",
];

/// Identifiers allowed between a parameter list and the body
const TRAILING_QUALIFIERS: &[&str] = &[
    "const", "volatile", "noexcept", "override", "final", "throw", "mutable", "constexpr",
    "__attribute__", "__attribute", "__declspec", "try",
];

const MAX_RAW_DELIMITER: usize = 16;

/// Default [`SourceParser`] for C and C++ translation units and headers
#[derive(Debug, Clone, Copy, Default)]
pub struct CScanner;

impl SourceParser for CScanner {
    fn parse(&self, source: &[u8]) -> Result<Vec<FunctionRecord>, ParseError> {
        let tokens = tokenize(source)?;
        let partner = pair_brackets(&tokens)?;
        let scan = Scan {
            src: source,
            toks: &tokens,
            partner: &partner,
            line_starts: line_starts(source),
        };
        scan.functions()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    Number,
    Literal,
    Punct(u8),
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

fn error(offset: usize, reason: impl Into<String>) -> ParseError {
    ParseError {
        offset,
        reason: reason.into(),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Skip a quoted literal starting at the opening quote, returning the offset past it
fn skip_quoted(src: &[u8], open: usize) -> Result<usize, ParseError> {
    let quote = src[open];
    let mut i = open + 1;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 2,
            b'\n' => break,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(error(open, "unterminated literal"))
}

/// Skip a C++11 raw string whose `"` is at `quote`
fn skip_raw_string(src: &[u8], quote: usize) -> Result<usize, ParseError> {
    let delim_start = quote + 1;
    let mut i = delim_start;
    while i < src.len() && src[i] != b'(' {
        if i - delim_start > MAX_RAW_DELIMITER || matches!(src[i], b' ' | b')' | b'\\' | b'\n') {
            return Err(error(quote, "malformed raw string delimiter"));
        }
        i += 1;
    }
    if i >= src.len() {
        return Err(error(quote, "unterminated raw string"));
    }
    let delim = &src[delim_start..i];
    let mut j = i + 1;
    while j < src.len() {
        if src[j] == b')'
            && src[j + 1..].starts_with(delim)
            && src.get(j + 1 + delim.len()) == Some(&b'"')
        {
            return Ok(j + delim.len() + 2);
        }
        j += 1;
    }
    Err(error(quote, "unterminated raw string"))
}

/// Skip a block comment starting at `/*`
fn skip_block_comment(src: &[u8], open: usize) -> Result<usize, ParseError> {
    let mut i = open + 2;
    while i + 1 < src.len() {
        if src[i] == b'*' && src[i + 1] == b'/' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(error(open, "unterminated comment"))
}

/// Skip to the end of a line, honouring backslash continuations
fn skip_logical_line(src: &[u8], mut i: usize) -> usize {
    while i < src.len() {
        match src[i] {
            b'\\' if src.get(i + 1) == Some(&b'\n') => i += 2,
            b'\\' if src.get(i + 1) == Some(&b'\r') && src.get(i + 2) == Some(&b'\n') => i += 3,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    i
}

/// Skip a preprocessor directive starting at `#`
fn skip_directive(src: &[u8], hash: usize) -> Result<usize, ParseError> {
    let mut i = hash + 1;
    while i < src.len() {
        match src[i] {
            b'\\' if src.get(i + 1) == Some(&b'\n') => i += 2,
            b'\\' if src.get(i + 1) == Some(&b'\r') && src.get(i + 2) == Some(&b'\n') => i += 3,
            b'\n' => return Ok(i),
            b'/' if src.get(i + 1) == Some(&b'*') => i = skip_block_comment(src, i)?,
            b'/' if src.get(i + 1) == Some(&b'/') => return Ok(skip_logical_line(src, i)),
            b'"' | b'\'' => {
                // `#error don't` is legal, so an unterminated quote just ends the scan
                i = skip_quoted(src, i).unwrap_or_else(|_| skip_logical_line(src, i));
            }
            _ => i += 1,
        }
    }
    Ok(i)
}

fn tokenize(src: &[u8]) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut line_start = true;
    let mut i = 0;

    while i < src.len() {
        let b = src[i];
        if b == b'\n' {
            line_start = true;
            i += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b'\\' && matches!(src.get(i + 1), Some(b'\n') | Some(b'\r')) {
            i += 1;
            continue;
        }
        if b == b'/' && src.get(i + 1) == Some(&b'/') {
            i = skip_logical_line(src, i);
            continue;
        }
        if b == b'/' && src.get(i + 1) == Some(&b'*') {
            i = skip_block_comment(src, i)?;
            continue;
        }
        if b == b'#' && line_start {
            i = skip_directive(src, i)?;
            continue;
        }
        line_start = false;

        let start = i;
        let kind = if is_ident_start(b) {
            while i < src.len() && is_ident_continue(src[i]) {
                i += 1;
            }
            let word = &src[start..i];
            match src.get(i) {
                Some(b'"') if matches!(word, b"R" | b"u8R" | b"uR" | b"UR" | b"LR") => {
                    i = skip_raw_string(src, i)?;
                    Kind::Literal
                }
                Some(b'"') | Some(b'\'') if matches!(word, b"L" | b"u" | b"U" | b"u8") => {
                    i = skip_quoted(src, i)?;
                    Kind::Literal
                }
                _ => Kind::Ident,
            }
        } else if b.is_ascii_digit() || (b == b'.' && src.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            i += 1;
            while i < src.len() {
                let c = src[i];
                let exponent_sign = matches!(c, b'+' | b'-')
                    && matches!(src[i - 1], b'e' | b'E' | b'p' | b'P');
                if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'\'' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            Kind::Number
        } else if b == b'"' || b == b'\'' {
            i = skip_quoted(src, i)?;
            Kind::Literal
        } else {
            i += 1;
            Kind::Punct(b)
        };
        tokens.push(Token { kind, start, end: i });
    }
    Ok(tokens)
}

/// Index of the matching bracket for every `(`, `[`, `{` and their closers
fn pair_brackets(tokens: &[Token]) -> Result<Vec<usize>, ParseError> {
    let mut partner = vec![usize::MAX; tokens.len()];
    let mut stack: Vec<(usize, u8)> = Vec::new();
    for (idx, tok) in tokens.iter().enumerate() {
        let Kind::Punct(p) = tok.kind else { continue };
        match p {
            b'(' | b'[' | b'{' => stack.push((idx, p)),
            b')' | b']' | b'}' => {
                let expected = match p {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match stack.pop() {
                    Some((open, o)) if o == expected => {
                        partner[open] = idx;
                        partner[idx] = open;
                    }
                    _ => return Err(error(tok.start, format!("unbalanced '{}'", p as char))),
                }
            }
            _ => {}
        }
    }
    if let Some(&(open, p)) = stack.last() {
        return Err(error(tokens[open].start, format!("unclosed '{}'", p as char)));
    }
    Ok(partner)
}

fn line_starts(src: &[u8]) -> Vec<usize> {
    std::iter::once(0)
        .chain(src.iter().enumerate().filter(|(_, &b)| b == b'\n').map(|(i, _)| i + 1))
        .collect()
}

/// What a `{` at declaration scope opens
enum Block {
    Scope,
    Function(String),
    InitBrace,
    Opaque,
}

struct Scan<'a> {
    src: &'a [u8],
    toks: &'a [Token],
    partner: &'a [usize],
    line_starts: Vec<usize>,
}

impl<'a> Scan<'a> {
    fn text(&self, idx: usize) -> &'a [u8] {
        let t = self.toks[idx];
        &self.src[t.start..t.end]
    }

    fn is_ident(&self, idx: usize, word: &str) -> bool {
        self.toks[idx].kind == Kind::Ident && self.text(idx) == word.as_bytes()
    }

    fn is_punct(&self, idx: usize, p: u8) -> bool {
        self.toks[idx].kind == Kind::Punct(p)
    }

    fn ident_in(&self, idx: usize, words: &[&str]) -> bool {
        self.toks[idx].kind == Kind::Ident && words.iter().any(|w| self.text(idx) == w.as_bytes())
    }

    /// `::` made of two adjacent colons ending at `idx`
    fn is_scope_op(&self, idx: usize) -> bool {
        idx >= 1
            && self.is_punct(idx, b':')
            && self.is_punct(idx - 1, b':')
            && self.toks[idx - 1].end == self.toks[idx].start
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(next) => next,
        }
    }

    fn functions(&self) -> Result<Vec<FunctionRecord>, ParseError> {
        let mut found = Vec::new();
        let mut header = 0;
        let mut i = 0;

        while i < self.toks.len() {
            match self.toks[i].kind {
                Kind::Punct(b';') | Kind::Punct(b'}') => header = i + 1,
                Kind::Punct(b'(') | Kind::Punct(b'[') => {
                    i = self.partner[i] + 1;
                    continue;
                }
                Kind::Punct(b'{') => {
                    let close = self.partner[i];
                    match self.classify(header, i) {
                        Block::Scope => header = i + 1,
                        Block::InitBrace => {
                            i = close + 1;
                            continue;
                        }
                        Block::Function(name) => {
                            found.push(self.record(name, i, close));
                            header = close + 1;
                            i = close + 1;
                            continue;
                        }
                        Block::Opaque => {
                            header = close + 1;
                            i = close + 1;
                            continue;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Ok(found)
    }

    fn classify(&self, from: usize, brace: usize) -> Block {
        if from >= brace {
            return Block::Opaque;
        }
        if self.is_ident(from, "namespace")
            || (self.is_ident(from, "inline") && from + 1 < brace && self.is_ident(from + 1, "namespace"))
        {
            return Block::Scope;
        }
        if self.is_ident(from, "extern") && brace - from == 2 && self.toks[from + 1].kind == Kind::Literal {
            return Block::Scope;
        }

        if let Some((name, params_close)) = self.function_head(from, brace) {
            return match self.trailing(params_close + 1, brace) {
                Trailing::Body => Block::Function(name),
                Trailing::InitList => {
                    // `: member{...}` braces precede the body
                    let prev = brace - 1;
                    if self.toks[prev].kind == Kind::Ident || self.is_punct(prev, b'>') {
                        Block::InitBrace
                    } else {
                        Block::Function(name)
                    }
                }
                Trailing::Invalid => Block::Opaque,
            };
        }

        let mut aggregate = false;
        let mut k = from;
        while k < brace {
            match self.toks[k].kind {
                Kind::Punct(b'(') | Kind::Punct(b'[') | Kind::Punct(b'{') => {
                    k = self.partner[k] + 1;
                    continue;
                }
                Kind::Punct(b'=') => return Block::Opaque,
                Kind::Ident if self.is_ident(k, "enum") => return Block::Opaque,
                Kind::Ident if self.ident_in(k, &["class", "struct", "union"]) => aggregate = true,
                _ => {}
            }
            k += 1;
        }
        if aggregate {
            Block::Scope
        } else {
            Block::Opaque
        }
    }

    /// Index of the `>` closing the template parameter list opened at `open`
    fn template_params_end(&self, open: usize, limit: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut k = open;
        while k < limit {
            match self.toks[k].kind {
                Kind::Punct(b'<') => depth += 1,
                Kind::Punct(b'>') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                Kind::Punct(b'(') | Kind::Punct(b'[') | Kind::Punct(b'{') => k = self.partner[k],
                _ => {}
            }
            k += 1;
        }
        None
    }

    /// Locate the function name and the `)` closing its parameter list
    fn function_head(&self, from: usize, brace: usize) -> Option<(String, usize)> {
        let mut k = from;
        while k < brace {
            match self.toks[k].kind {
                Kind::Punct(b'=') => return None,
                Kind::Punct(b'[') | Kind::Punct(b'{') => k = self.partner[k] + 1,
                Kind::Ident if self.text(k) == b"template" && k + 1 < brace && self.is_punct(k + 1, b'<') => {
                    k = self.template_params_end(k + 1, brace)? + 1;
                }
                // template arguments may hold their own `()`, as in `std::function<void()>`
                Kind::Punct(b'<') if k > from && self.toks[k - 1].kind == Kind::Ident => {
                    k = self.template_params_end(k, brace).map_or(k + 1, |close| close + 1);
                }
                Kind::Ident if self.text(k) == b"operator" => {
                    let (name_end, open) = self.operator_params(k, brace)?;
                    let name = self.qualified_name(k, name_end);
                    return Some((name, self.partner[open]));
                }
                Kind::Punct(b'(') => {
                    let close = self.partner[k];
                    if k == from {
                        return None;
                    }
                    let prev = k - 1;
                    if self.ident_in(prev, ATTRIBUTE_KEYWORDS) {
                        k = close + 1;
                        continue;
                    }
                    let name_end = if self.is_punct(prev, b'>') {
                        self.template_args_start(from, prev)?.checked_sub(1)?
                    } else {
                        prev
                    };
                    if name_end < from
                        || self.toks[name_end].kind != Kind::Ident
                        || self.ident_in(name_end, CONTROL_KEYWORDS)
                    {
                        return None;
                    }
                    let name = self.qualified_name(name_end, prev);
                    return Some((name, close));
                }
                _ => k += 1,
            }
        }
        None
    }

    /// For `operator` at `op`, the last token of the operator name and the parameter `(`
    fn operator_params(&self, op: usize, brace: usize) -> Option<(usize, usize)> {
        let next = op + 1;
        if next >= brace {
            return None;
        }
        // operator() takes its first pair as part of the name
        if self.is_punct(next, b'(') && self.partner[next] == next + 1 {
            let open = next + 2;
            return (open < brace && self.is_punct(open, b'(')).then_some((next + 1, open));
        }
        let mut k = next;
        while k < brace && !self.is_punct(k, b'(') {
            if self.is_punct(k, b'[') {
                k = self.partner[k];
            }
            k += 1;
        }
        (k < brace && k > next).then_some((k - 1, k))
    }

    /// Index of the `<` matching the `>` at `close`, scanning backwards
    fn template_args_start(&self, from: usize, close: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut k = close;
        loop {
            if self.is_punct(k, b'>') {
                depth += 1;
            } else if self.is_punct(k, b'<') {
                depth -= 1;
                if depth == 0 {
                    return Some(k);
                }
            }
            if k == from {
                return None;
            }
            k -= 1;
        }
    }

    /// Name text from the start of its qualification through token `last`,
    /// with whitespace removed except between words
    fn qualified_name(&self, name_start: usize, last: usize) -> String {
        let mut first = name_start;
        if first >= 1 && self.is_punct(first - 1, b'~') {
            first -= 1;
        }
        loop {
            if first < 2 || !self.is_scope_op(first - 1) {
                break;
            }
            if first == 2 {
                // leading `::`
                first = 0;
                break;
            }
            let before = first - 3;
            if self.toks[before].kind == Kind::Ident && !self.ident_in(before, CONTROL_KEYWORDS) {
                first = before;
            } else if self.is_punct(before, b'>') {
                match self.template_args_start(0, before) {
                    Some(lt) if lt >= 1 && self.toks[lt - 1].kind == Kind::Ident => first = lt - 1,
                    _ => break,
                }
            } else {
                first -= 2;
                break;
            }
        }

        let mut name = String::new();
        let mut prev_word = false;
        for idx in first..=last {
            let word = self.toks[idx].kind == Kind::Ident;
            if word && prev_word {
                name.push(' ');
            }
            name.push_str(&String::from_utf8_lossy(self.text(idx)));
            prev_word = word;
        }
        name
    }

    /// Classify the tokens between the parameter list and the body
    fn trailing(&self, from: usize, brace: usize) -> Trailing {
        let mut k = from;
        while k < brace {
            let tok = self.toks[k];
            match tok.kind {
                Kind::Punct(b':') if !(k + 1 < brace && self.is_punct(k + 1, b':')) => {
                    return Trailing::InitList
                }
                Kind::Punct(b'-') if k + 1 < brace && self.is_punct(k + 1, b'>') => {
                    return Trailing::Body
                }
                Kind::Punct(b'&') => k += 1,
                Kind::Punct(b'[') | Kind::Punct(b'(') => k = self.partner[k] + 1,
                Kind::Ident if self.text(k) == b"requires" => return Trailing::Body,
                Kind::Ident if self.ident_in(k, TRAILING_QUALIFIERS) || self.looks_like_macro(k) => {
                    k += 1
                }
                _ => return Trailing::Invalid,
            }
        }
        Trailing::Body
    }

    /// All-caps identifiers such as `__THROW` or `NOEXCEPT` expand to qualifiers
    fn looks_like_macro(&self, k: usize) -> bool {
        let text = self.text(k);
        text.iter().any(u8::is_ascii_uppercase)
            && text.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_')
    }

    fn record(&self, name: String, open: usize, close: usize) -> FunctionRecord {
        let body_start = self.toks[open].start;
        let body_end = self.toks[close].end;
        let mut first_statement = body_start + 1;
        while first_statement < self.toks[close].start && self.src[first_statement].is_ascii_whitespace() {
            first_statement += 1;
        }
        FunctionRecord {
            name,
            body: body_start..body_end,
            lines: self.line_of(body_start)..=self.line_of(self.toks[close].start),
            first_statement,
            returns: self.returns(open, close),
        }
    }

    fn returns(&self, open: usize, close: usize) -> Vec<ReturnSite> {
        let mut sites = Vec::new();
        let mut j = open + 1;
        while j < close {
            if self.is_punct(j, b'{') && (self.opens_lambda(open, j) || self.opens_local_class(open, j)) {
                j = self.partner[j] + 1;
                continue;
            }
            if self.is_ident(j, "return") {
                let mut k = j + 1;
                while k < close && !self.is_punct(k, b';') {
                    if matches!(self.toks[k].kind, Kind::Punct(b'(') | Kind::Punct(b'[') | Kind::Punct(b'{')) {
                        k = self.partner[k];
                    }
                    k += 1;
                }
                if k < close {
                    sites.push(ReturnSite {
                        start: self.toks[j].start,
                        end: self.toks[k].end,
                    });
                }
                j = k + 1;
                continue;
            }
            j += 1;
        }
        sites
    }

    /// `[captures](params) specifiers -> type {` or `[captures] {`
    fn opens_lambda(&self, floor: usize, brace: usize) -> bool {
        let mut k = brace - 1;
        while k > floor {
            match self.toks[k].kind {
                Kind::Punct(b']') => return true,
                Kind::Punct(b')') => {
                    let open = self.partner[k];
                    return open > floor && self.is_punct(open - 1, b']');
                }
                Kind::Ident | Kind::Punct(b':') | Kind::Punct(b'<') | Kind::Punct(b'>')
                | Kind::Punct(b'*') | Kind::Punct(b'&') | Kind::Punct(b'-') | Kind::Punct(b',') => {
                    if self.is_ident(k, "else") || self.is_ident(k, "do") || self.is_ident(k, "try") {
                        return false;
                    }
                    k -= 1;
                }
                _ => return false,
            }
        }
        false
    }

    /// `struct Local : Base {` inside a function body
    fn opens_local_class(&self, floor: usize, brace: usize) -> bool {
        let mut k = brace - 1;
        while k > floor {
            match self.toks[k].kind {
                Kind::Ident => {
                    if self.ident_in(k, &["class", "struct", "union"]) {
                        return true;
                    }
                }
                Kind::Punct(b':') | Kind::Punct(b',') | Kind::Punct(b'<') | Kind::Punct(b'>') => {}
                _ => return false,
            }
            k -= 1;
        }
        false
    }
}

enum Trailing {
    Body,
    InitList,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<FunctionRecord> {
        CScanner.parse(src.as_bytes()).unwrap()
    }

    fn names(src: &str) -> Vec<String> {
        parse(src).into_iter().map(|f| f.name).collect()
    }

    #[test]
    fn test_plain_c_functions() {
        let src = "static int add(int a, int b)\n{\n    return a + b;\n}\n\nvoid noop(void) {}\n";
        let fns = parse(src);
        assert_eq!(fns.len(), 2);
        assert_eq!(fns[0].name, "add");
        assert_eq!(fns[0].lines, 2..=4);
        assert_eq!(fns[0].returns.len(), 1);
        let ret = fns[0].returns[0];
        assert_eq!(&src[ret.start..ret.end], "return a + b;");
        assert_eq!(&src[fns[0].first_statement..ret.end], "return a + b;");
        assert_eq!(fns[1].name, "noop");
        assert!(fns[1].returns.is_empty());
        assert_eq!(&src[fns[1].body.clone()], "{}");
    }

    #[test]
    fn test_skips_declarations_and_initializers() {
        let src = r#"
int proto(int x);
static const int table[] = { 1, 2, 3 };
struct point { int x, y; };
enum color { RED, GREEN };
struct point origin = { 0, 0 };
int real(void) { return table[0]; }
"#;
        assert_eq!(names(src), vec!["real"]);
    }

    #[test]
    fn test_comments_strings_and_directives_are_ignored() {
        let src = r#"
#define BODY { return 1; }
#define MULTI(x) \
    do { x; } while (0)
/* int fake(void) { return 0; } */
// int other(void) {
const char *s = "int f() {";
char c = '{';
int ok(void) { const char *t = "}"; return t[0]; }
"#;
        let fns = parse(src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "ok");
        assert_eq!(fns[0].returns.len(), 1);
    }

    #[test]
    fn test_cpp_scopes_and_qualified_names() {
        let src = r#"
namespace outer {
namespace inner {
class Widget : public Base {
public:
    Widget() : count_{0}, name_("w") {}
    ~Widget() override {}
    int size() const noexcept { return count_; }
    bool operator==(const Widget &o) const { return count_ == o.count_; }
private:
    int count_;
};
int Widget::grow(int by) { count_ += by; return count_; }
}  // namespace inner
}  // namespace outer
extern "C" {
void c_entry(void) { }
}
"#;
        assert_eq!(
            names(src),
            vec!["Widget", "~Widget", "size", "operator==", "Widget::grow", "c_entry"]
        );
    }

    #[test]
    fn test_operator_call_and_trailing_return() {
        let src = "struct F { int operator()(int x) { return x; } };\nauto g(int x) -> int { return x; }\n";
        assert_eq!(names(src), vec!["operator()", "g"]);
    }

    #[test]
    fn test_control_blocks_are_not_functions() {
        let src = "int f(int x) {\n  if (x) { return 1; }\n  for (;;) { break; }\n  while (x--) {}\n  return 0;\n}\n";
        let fns = parse(src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].returns.len(), 2);
    }

    #[test]
    fn test_lambda_returns_are_excluded() {
        let src = "int f(std::vector<int> &v) {\n  auto cmp = [](int a, int b) -> bool { return a < b; };\n  std::sort(v.begin(), v.end(), [&](int a, int b) { return a > b; });\n  return v[0];\n}\n";
        let fns = parse(src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].returns.len(), 1);
        let ret = fns[0].returns[0];
        assert_eq!(&src[ret.start..ret.end], "return v[0];");
    }

    #[test]
    fn test_return_with_braced_init() {
        let src = "Point make() { return Point{1, 2}; }\n";
        let fns = parse(src);
        let ret = fns[0].returns[0];
        assert_eq!(&src[ret.start..ret.end], "return Point{1, 2};");
    }

    #[test]
    fn test_attribute_and_template_heads() {
        let src = "__attribute__((noinline)) static int cold(void) { return 0; }\ntemplate <typename T>\nT twice(T v) { return v + v; }\n";
        assert_eq!(names(src), vec!["cold", "twice"]);
    }

    #[test]
    fn test_parenthesised_template_arguments_in_return_type() {
        let src = "std::function<void()> make()\n{\n    return nullptr;\n}\nstd::map<int, std::function<int(int)>> table(int n) { return {}; }\nint plain()\n{\n    return 0;\n}\n";
        let fns = parse(src);
        let found: Vec<&str> = fns.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(found, vec!["make", "table", "plain"]);
        assert_eq!(fns[0].lines, 2..=4);
        assert_eq!(fns[0].returns.len(), 1);
    }

    #[test]
    fn test_raw_string_and_digit_separators() {
        let src = "const char *r = R\"x(int f() { )x\";\nlong big(void) { return 1'000'000; }\n";
        assert_eq!(names(src), vec!["big"]);
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        let err = CScanner.parse(b"int f(void) { /* oops").unwrap_err();
        assert!(err.reason.contains("comment"));
    }

    #[test]
    fn test_unbalanced_braces_are_an_error() {
        let src = "#ifdef A\nvoid f(void) {\n#else\nvoid f(int x) {\n#endif\n}\n";
        // both branches open a brace, only one closes
        assert!(CScanner.parse(src.as_bytes()).is_err());
        assert!(CScanner.parse(b"int f(void) { return 0; }}").is_err());
    }

    #[test]
    fn test_line_numbers_follow_braces() {
        let src = "\n\nint f(void)\n{\n\n  return 0;\n\n}\n";
        let fns = parse(src);
        assert_eq!(fns[0].lines, 4..=8);
    }
}
