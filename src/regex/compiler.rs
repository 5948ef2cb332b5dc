//! Compiles a parsed pattern ([`regex_syntax::hir::Hir`]) into a
//! [`Program`].
//!
//! Parsing itself is left to `regex-syntax` — the "regex compiler" §1
//! treats as an external collaborator — configured for raw bytes
//! (`utf8(false)`, `unicode(false)`) so every character class resolves to
//! [`regex_syntax::hir::ClassBytes`] and we never have to reason about
//! partially-decoded UTF-8 at a chunk boundary.

use regex_syntax::hir::{Hir, HirKind, Look};
use regex_syntax::ParserBuilder;

use super::program::{Inst, Program, DANGLING};
use super::CompileError;

/// Parses `pattern` and compiles it into a [`Program`].
///
/// `case_insensitive` mirrors the `i` flag of `replace_filter`.
pub fn compile(pattern: &str, case_insensitive: bool) -> Result<Program, CompileError> {
    let hir = ParserBuilder::new()
        .utf8(false)
        .unicode(false)
        .case_insensitive(case_insensitive)
        .build()
        .parse(pattern)
        .map_err(|err| CompileError::Parse(err.to_string()))?;

    let mut c = Compiler { insts: Vec::new() };
    let frag = c.compile_hir(&hir)?;
    let match_pc = c.push(Inst::Match);
    c.patch(&frag.out, match_pc);

    Ok(Program {
        anchored_start: starts_with_anchor(&hir),
        insts: c.insts,
        start: frag.start,
    })
}

fn starts_with_anchor(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Look(Look::Start) => true,
        HirKind::Concat(subs) => subs.first().is_some_and(starts_with_anchor),
        HirKind::Capture(cap) => starts_with_anchor(cap.sub.as_ref()),
        _ => false,
    }
}

/// A partially-built piece of program: where execution enters, and the
/// list of dangling continuation slots still waiting for a target. Every
/// pc in `out` carries exactly one field still set to [`DANGLING`], so
/// patching never needs to pick between several unresolved arms on the
/// same instruction.
struct Frag {
    start: usize,
    out: Vec<usize>,
}

struct Compiler {
    insts: Vec<Inst>,
}

impl Compiler {
    fn push(&mut self, inst: Inst) -> usize {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    /// Points every dangling slot in `hole` at `target`.
    fn patch(&mut self, hole: &[usize], target: usize) {
        for &pc in hole {
            patch_one(&mut self.insts[pc], target);
        }
    }

    fn compile_hir(&mut self, hir: &Hir) -> Result<Frag, CompileError> {
        match hir.kind() {
            HirKind::Empty => {
                let pc = self.push(Inst::Jmp(DANGLING));
                Ok(Frag { start: pc, out: vec![pc] })
            }
            HirKind::Literal(lit) => self.compile_bytes(&lit.0),
            HirKind::Class(class) => {
                let ranges = match class {
                    regex_syntax::hir::Class::Bytes(b) => {
                        b.ranges().iter().map(|r| (r.start(), r.end())).collect()
                    }
                    regex_syntax::hir::Class::Unicode(_) => {
                        return Err(CompileError::Unsupported(
                            "unicode class (pattern is compiled in byte mode)".into(),
                        ))
                    }
                };
                let pc = self.push(Inst::Ranges { ranges, next: DANGLING });
                Ok(Frag { start: pc, out: vec![pc] })
            }
            HirKind::Look(Look::Start) => {
                let pc = self.push(Inst::StartAnchor(DANGLING));
                Ok(Frag { start: pc, out: vec![pc] })
            }
            HirKind::Look(Look::End) => {
                let pc = self.push(Inst::EndAnchor(DANGLING));
                Ok(Frag { start: pc, out: vec![pc] })
            }
            HirKind::Look(other) => {
                Err(CompileError::Unsupported(format!("look-around assertion {other:?}")))
            }
            HirKind::Capture(cap) => self.compile_hir(cap.sub.as_ref()),
            HirKind::Concat(subs) => self.compile_concat(subs),
            HirKind::Alternation(subs) => self.compile_alternation(subs),
            HirKind::Repetition(rep) => self.compile_repetition(rep),
        }
    }

    /// A literal is just a chain of single-byte `Ranges` instructions, each
    /// one's `next` pointing at the one after it.
    fn compile_bytes(&mut self, bytes: &[u8]) -> Result<Frag, CompileError> {
        if bytes.is_empty() {
            let pc = self.push(Inst::Jmp(DANGLING));
            return Ok(Frag { start: pc, out: vec![pc] });
        }

        let start = self.insts.len();
        for &b in bytes {
            self.push(Inst::Ranges { ranges: vec![(b, b)], next: DANGLING });
        }
        for pc in start..self.insts.len() - 1 {
            let next = pc + 1;
            patch_one(&mut self.insts[pc], next);
        }
        let last = self.insts.len() - 1;
        Ok(Frag { start, out: vec![last] })
    }

    fn compile_concat(&mut self, subs: &[Hir]) -> Result<Frag, CompileError> {
        let mut subs = subs.iter();
        let Some(first) = subs.next() else {
            let pc = self.push(Inst::Jmp(DANGLING));
            return Ok(Frag { start: pc, out: vec![pc] });
        };

        let mut frag = self.compile_hir(first)?;
        for sub in subs {
            let next = self.compile_hir(sub)?;
            self.patch(&frag.out, next.start);
            frag = Frag { start: frag.start, out: next.out };
        }
        Ok(frag)
    }

    fn compile_alternation(&mut self, subs: &[Hir]) -> Result<Frag, CompileError> {
        if subs.is_empty() {
            let pc = self.push(Inst::Jmp(DANGLING));
            return Ok(Frag { start: pc, out: vec![pc] });
        }
        if subs.len() == 1 {
            return self.compile_hir(&subs[0]);
        }

        // Chain of binary splits: split(first, rest-of-alternation).
        let rest = self.compile_alternation(&subs[1..])?;
        let split_pc = self.push(Inst::Split(DANGLING, rest.start));
        let first = self.compile_hir(&subs[0])?;
        self.insts[split_pc] = Inst::Split(first.start, rest.start);

        let mut out = first.out;
        out.extend(rest.out);
        Ok(Frag { start: split_pc, out })
    }

    fn compile_repetition(
        &mut self,
        rep: &regex_syntax::hir::Repetition,
    ) -> Result<Frag, CompileError> {
        let min = rep.min;
        let max = rep.max;
        let greedy = rep.greedy;

        match (min, max) {
            (0, Some(1)) => self.compile_optional(rep.sub.as_ref(), greedy),
            (0, None) => self.compile_star(rep.sub.as_ref(), greedy),
            (1, None) => self.compile_plus(rep.sub.as_ref(), greedy),
            (min, max) => self.compile_bounded(rep.sub.as_ref(), min, max, greedy),
        }
    }

    /// `sub?`: split between entering `sub` and skipping it, one arm fixed
    /// up immediately, the other left dangling as this fragment's hole.
    fn compile_optional(&mut self, sub: &Hir, greedy: bool) -> Result<Frag, CompileError> {
        let split_pc = self.push(Inst::Split(DANGLING, DANGLING));
        let frag = self.compile_hir(sub)?;
        self.insts[split_pc] = if greedy {
            Inst::Split(frag.start, DANGLING)
        } else {
            Inst::Split(DANGLING, frag.start)
        };
        let mut out = frag.out;
        out.push(split_pc);
        Ok(Frag { start: split_pc, out })
    }

    /// `sub*`: like `sub?`, but the body loops back to the split instead of
    /// falling through.
    fn compile_star(&mut self, sub: &Hir, greedy: bool) -> Result<Frag, CompileError> {
        let split_pc = self.push(Inst::Split(DANGLING, DANGLING));
        let frag = self.compile_hir(sub)?;
        self.patch(&frag.out, split_pc);
        self.insts[split_pc] = if greedy {
            Inst::Split(frag.start, DANGLING)
        } else {
            Inst::Split(DANGLING, frag.start)
        };
        Ok(Frag { start: split_pc, out: vec![split_pc] })
    }

    /// `sub+`: one mandatory copy of `sub` followed by `sub*`.
    fn compile_plus(&mut self, sub: &Hir, greedy: bool) -> Result<Frag, CompileError> {
        let frag = self.compile_hir(sub)?;
        let split_pc = self.push(Inst::Split(DANGLING, DANGLING));
        self.patch(&frag.out, split_pc);
        self.insts[split_pc] = if greedy {
            Inst::Split(frag.start, DANGLING)
        } else {
            Inst::Split(DANGLING, frag.start)
        };
        Ok(Frag { start: frag.start, out: vec![split_pc] })
    }

    /// `{min,max}` (and `{min,}` already handled above as star/plus), by
    /// unrolling: `min` mandatory copies followed by `max - min` optional
    /// ones, or an unbounded tail if `max` is `None`.
    fn compile_bounded(
        &mut self,
        sub: &Hir,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    ) -> Result<Frag, CompileError> {
        let mut pieces = Vec::new();
        for _ in 0..min {
            pieces.push(self.compile_hir(sub)?);
        }

        let tail = match max {
            None => Some(self.compile_star(sub, greedy)?),
            Some(max) if max > min => {
                let mut opt_pieces = Vec::new();
                for _ in 0..(max - min) {
                    opt_pieces.push(self.compile_optional(sub, greedy)?);
                }
                Some(chain_frags(self, opt_pieces)?)
            }
            _ => None,
        };

        if let Some(tail) = tail {
            pieces.push(tail);
        }

        if pieces.is_empty() {
            let pc = self.push(Inst::Jmp(DANGLING));
            return Ok(Frag { start: pc, out: vec![pc] });
        }

        chain_frags(self, pieces)
    }
}

fn chain_frags(c: &mut Compiler, mut frags: Vec<Frag>) -> Result<Frag, CompileError> {
    let mut iter = frags.drain(..);
    let mut acc = iter.next().expect("chain_frags called with no fragments");
    for next in iter {
        c.patch(&acc.out, next.start);
        acc = Frag { start: acc.start, out: next.out };
    }
    Ok(acc)
}

fn patch_one(inst: &mut Inst, target: usize) {
    match inst {
        Inst::Jmp(t) if *t == DANGLING => *t = target,
        Inst::Ranges { next, .. } if *next == DANGLING => *next = target,
        Inst::StartAnchor(next) if *next == DANGLING => *next = target,
        Inst::EndAnchor(next) if *next == DANGLING => *next = target,
        Inst::Split(a, b) => {
            if *a == DANGLING {
                *a = target;
            } else if *b == DANGLING {
                *b = target;
            }
        }
        _ => {}
    }
}
