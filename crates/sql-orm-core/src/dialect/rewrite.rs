// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The function-snippet rewriter: rewrites portable SQL function calls and
//! bare placeholder tokens into dialect-specific fragments.

use std::collections::HashMap;

/// A function-call snippet: `NAME(<p1>, <p2>, ..., <pN>)` rewrites to
/// `fragment` with each `<pI>` substituted by the matching argument.
#[derive(Debug, Clone)]
pub struct FunctionSnippet {
    /// Parameter placeholder names, in order (`p1`, `p2`, ...).
    pub params: Vec<String>,
    /// The dialect fragment template.
    pub fragment: String
}

impl FunctionSnippet {
    /// Convenience constructor for a fixed arity.
    pub fn new(arity: usize, fragment: impl Into<String>) -> Self {
        Self {
            params: (1..=arity).map(|i| format!("p{i}")).collect(),
            fragment: fragment.into()
        }
    }
}

/// The full mapping of portable tokens to dialect fragments: bare
/// `#PLACEHOLDER#` literals plus `NAME(...)` function-call snippets.
#[derive(Debug, Clone, Default)]
pub struct SnippetTable {
    placeholders: HashMap<String, String>,
    functions: HashMap<String, FunctionSnippet>
}

impl SnippetTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pure placeholder token (no arguments), e.g. `"#TODAY#"`.
    pub fn placeholder(&mut self, token: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.placeholders.insert(token.into(), value.into());
        self
    }

    /// Register a function-call snippet.
    pub fn function(&mut self, name: impl Into<String>, snippet: FunctionSnippet) -> &mut Self {
        self.functions.insert(name.into(), snippet);
        self
    }

    /// Rewrite all occurrences of every registered token/snippet in `sql`,
    /// iterating until a full pass makes no further change (so nested
    /// function calls resolve from the inside out).
    pub fn rewrite(&self, sql: &str) -> String {
        let mut out = sql.to_string();
        for (token, value) in &self.placeholders {
            out = out.replace(token, value);
        }

        loop {
            let mut changed = false;
            for (name, snippet) in &self.functions {
                while let Some(next) = apply_once(&out, name, snippet) {
                    out = next;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        out
    }
}

/// Find the first `NAME(...)` occurrence (as a whole token, not a
/// substring of a longer identifier) and return `sql` with it replaced by
/// the snippet's fragment with arguments substituted. `None` if no
/// occurrence is found.
fn apply_once(sql: &str, name: &str, snippet: &FunctionSnippet) -> Option<String> {
    let bytes = sql.as_bytes();
    let needle = format!("{name}(");
    let mut search_from = 0usize;

    while let Some(rel) = sql[search_from..].find(&needle) {
        let start = search_from + rel;
        let preceded_ok = start == 0 || !is_ident_char(bytes[start - 1]);
        if !preceded_ok {
            search_from = start + 1;
            continue;
        }

        let paren_open = start + name.len();
        let close = match find_matching_paren(sql, paren_open) {
            Some(c) => c,
            None => {
                search_from = start + 1;
                continue;
            }
        };

        let args_str = &sql[paren_open + 1..close];
        let args = split_top_level_commas(args_str);
        if args.len() != snippet.params.len() {
            search_from = start + 1;
            continue;
        }

        let mut fragment = snippet.fragment.clone();
        for (param, arg) in snippet.params.iter().zip(args.iter()) {
            fragment = fragment.replace(&format!("<{param}>"), arg.trim());
        }

        let mut result = String::with_capacity(sql.len());
        result.push_str(&sql[..start]);
        result.push_str(&fragment);
        result.push_str(&sql[close + 1..]);
        return Some(result);
    }

    None
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn find_matching_paren(sql: &str, open_idx: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    if bytes.get(open_idx) != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in args.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c)
        }
    }
    parts.push(current.trim().to_string());
    parts
}
