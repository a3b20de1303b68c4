/// Code Synthesizer
///
/// Builds the runnable Python artifact for a candidate. Call-based candidates
/// only get the standard imports prepended. Stdin candidates are free-form
/// scripts, so two variants are produced: an execute variant run directly as a
/// subprocess, and a compile variant whose body is wrapped in `def code():`
/// so the suite can fall back to an explicit entry-point call.
use crate::normalizer::ExecutionMode;

/// Name of the wrapper function in the compile variant
pub const ENTRY_POINT: &str = "code";

/// Standard-library imports available to every candidate
pub const STANDARD_IMPORTS: &str = "import sys
import time
import itertools
from itertools import accumulate, product, permutations, combinations
import collections
from collections import Counter, OrderedDict, deque, defaultdict, ChainMap
from functools import lru_cache
import math
from math import sqrt, sin, cos, tan, ceil, fabs, floor, gcd, exp, log, log2
import fractions
from typing import List, Tuple
import random
import heapq
from heapq import *
";

const STREAM_ALIASES: &str = "\nstdin = sys.stdin\nstdout = sys.stdout\n";

/// Synthesized, directly executable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateArtifact {
    CallBased { program: String },
    StandardInput {
        /// Imports + `def code():` wrapper; loaded to detect compile errors
        compile_variant: String,
        /// Imports + the script verbatim; the primary subprocess body
        execute_variant: String,
    },
}

impl CandidateArtifact {
    /// Script used when every stdin run exited with the uniform-retry code
    pub fn fallback_script(&self) -> Option<String> {
        match self {
            CandidateArtifact::StandardInput {
                compile_variant, ..
            } => Some(format!("{}\n{}()\n", compile_variant, ENTRY_POINT)),
            CandidateArtifact::CallBased { .. } => None,
        }
    }
}

/// Classification of one source line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `from x import *`, possibly indented
    WildcardImport,
    /// `import x` / `from x import y` at column zero
    PlainImport,
    Code,
}

pub fn classify_line(line: &str) -> LineKind {
    if line.contains("import *") {
        LineKind::WildcardImport
    } else if line.starts_with("from ") || line.starts_with("import ") {
        LineKind::PlainImport
    } else {
        LineKind::Code
    }
}

/// Build the artifact for `mode` from the harness template and candidate source
pub fn synthesize(candidate: &str, harness_template: &str, mode: &ExecutionMode) -> CandidateArtifact {
    let source = if harness_template.is_empty() {
        candidate.to_string()
    } else {
        format!("{}\n{}", harness_template, candidate)
    };

    match mode {
        ExecutionMode::CallBased { .. } => CandidateArtifact::CallBased {
            program: synthesize_call_based(&source),
        },
        ExecutionMode::StandardInput => {
            let (compile_variant, execute_variant) = synthesize_standard_input(&source);
            CandidateArtifact::StandardInput {
                compile_variant,
                execute_variant,
            }
        }
    }
}

fn synthesize_call_based(source: &str) -> String {
    format!("{}{}", STANDARD_IMPORTS, source)
}

fn synthesize_standard_input(source: &str) -> (String, String) {
    let lines: Vec<&str> = source.split('\n').collect();
    let kinds: Vec<LineKind> = lines.iter().map(|line| classify_line(line)).collect();

    let wildcard_imports: Vec<&str> = lines
        .iter()
        .zip(&kinds)
        .filter(|(_, kind)| **kind == LineKind::WildcardImport)
        .map(|(line, _)| line.trim_start_matches('\t'))
        .collect();

    let mut compile_variant = String::new();
    let mut execute_variant = String::new();
    let mut started = false;

    for (line, kind) in lines.iter().zip(&kinds) {
        if *kind == LineKind::Code && !started && !line.trim().is_empty() {
            execute_variant.push_str(STANDARD_IMPORTS);
            execute_variant.push_str(STREAM_ALIASES);

            compile_variant.push_str(STANDARD_IMPORTS);
            compile_variant.push_str(&wildcard_imports.join("\n"));
            compile_variant.push_str(STREAM_ALIASES);
            compile_variant.push_str(&format!("def {}():\n", ENTRY_POINT));
            started = true;
        }

        execute_variant.push_str(line);
        execute_variant.push('\n');

        if *kind != LineKind::WildcardImport {
            if started {
                compile_variant.push('\t');
            }
            compile_variant.push_str(line);
            compile_variant.push('\n');
        }
    }

    if !started {
        // import-only source: keep an entry point so the fallback stays callable
        let prefix = std::mem::take(&mut compile_variant);
        compile_variant.push_str(STANDARD_IMPORTS);
        compile_variant.push_str(&wildcard_imports.join("\n"));
        compile_variant.push('\n');
        compile_variant.push_str(&prefix);
        compile_variant.push_str(STREAM_ALIASES);
        compile_variant.push_str(&format!("def {}():\n\tpass\n", ENTRY_POINT));

        execute_variant = format!("{}{}{}", STANDARD_IMPORTS, STREAM_ALIASES, execute_variant);
    }

    (compile_variant, execute_variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM_SCRIPT: &str = "from os import *\nimport re\na, b = map(int, input().split())\nimport string\nprint(a + b)";

    #[test]
    fn test_line_classification() {
        assert_eq!(classify_line("from heapq import *"), LineKind::WildcardImport);
        assert_eq!(classify_line("\tfrom math import *"), LineKind::WildcardImport);
        assert_eq!(classify_line("import sys"), LineKind::PlainImport);
        assert_eq!(classify_line("from a import b"), LineKind::PlainImport);
        assert_eq!(classify_line("    import sys"), LineKind::Code);
        assert_eq!(classify_line("print(1)"), LineKind::Code);
    }

    #[test]
    fn test_call_based_prepends_imports_verbatim() {
        let mode = ExecutionMode::CallBased {
            fn_name: "add".into(),
        };
        let artifact = synthesize("def add(a, b):\n    return a + b", "", &mode);
        let CandidateArtifact::CallBased { program } = artifact else {
            panic!("expected call-based artifact");
        };
        assert!(program.starts_with(STANDARD_IMPORTS));
        assert!(program.ends_with("def add(a, b):\n    return a + b"));
    }

    #[test]
    fn test_harness_template_is_prepended() {
        let mode = ExecutionMode::CallBased {
            fn_name: "f".into(),
        };
        let artifact = synthesize("def f(): pass", "import bisect", &mode);
        let CandidateArtifact::CallBased { program } = artifact else {
            panic!("expected call-based artifact");
        };
        assert!(program.contains("import bisect\ndef f(): pass"));
    }

    #[test]
    fn test_compile_variant_wraps_code_in_entry_point() {
        let artifact = synthesize(SUM_SCRIPT, "", &ExecutionMode::StandardInput);
        let CandidateArtifact::StandardInput {
            compile_variant, ..
        } = artifact
        else {
            panic!("expected stdin artifact");
        };

        // plain imports seen before the first code line stay at top level
        assert!(compile_variant.starts_with("import re\n"));
        assert!(compile_variant.contains(&format!(
            "{}from os import *{}def code():\n",
            STANDARD_IMPORTS, STREAM_ALIASES
        )));
        assert!(compile_variant.contains("def code():\n\ta, b = map(int, input().split())\n\timport string\n\tprint(a + b)\n"));
        // the wildcard import is hoisted, never wrapped
        assert!(!compile_variant.contains("\tfrom os import *"));
    }

    #[test]
    fn test_execute_variant_keeps_lines_unindented() {
        let artifact = synthesize(SUM_SCRIPT, "", &ExecutionMode::StandardInput);
        let CandidateArtifact::StandardInput {
            execute_variant, ..
        } = artifact
        else {
            panic!("expected stdin artifact");
        };
        assert!(execute_variant.starts_with("from os import *\nimport re\n"));
        assert!(execute_variant.contains(&format!("{}{}a, b = map", STANDARD_IMPORTS, STREAM_ALIASES)));
        assert!(execute_variant.ends_with("import string\nprint(a + b)\n"));
    }

    #[test]
    fn test_fallback_script_calls_entry_point() {
        let artifact = synthesize("print(1)", "", &ExecutionMode::StandardInput);
        let fallback = artifact.fallback_script().unwrap();
        assert!(fallback.ends_with("\tprint(1)\n\ncode()\n"));

        let call = synthesize("def f(): pass", "", &ExecutionMode::CallBased { fn_name: "f".into() });
        assert!(call.fallback_script().is_none());
    }

    #[test]
    fn test_trailing_blank_line_does_not_open_wrapper() {
        let artifact = synthesize("import sys\n", "", &ExecutionMode::StandardInput);
        let CandidateArtifact::StandardInput {
            compile_variant, ..
        } = artifact
        else {
            panic!("expected stdin artifact");
        };
        assert!(compile_variant.ends_with("def code():\n\tpass\n"));
    }

    #[test]
    fn test_import_only_source_still_defines_entry_point() {
        let artifact = synthesize("import sys", "", &ExecutionMode::StandardInput);
        let CandidateArtifact::StandardInput {
            compile_variant,
            execute_variant,
        } = artifact
        else {
            panic!("expected stdin artifact");
        };
        assert!(compile_variant.ends_with("def code():\n\tpass\n"));
        assert!(execute_variant.starts_with(STANDARD_IMPORTS));
    }
}
