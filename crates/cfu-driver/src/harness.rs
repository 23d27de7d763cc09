//! Hardware/software equivalence harness
//!
//! Feeds one command stream to two bindings in lockstep and records every
//! command whose results disagree with the expected relation. Scanning never
//! stops at the first mismatch; the report keeps the first few with full
//! operands so each can be re-issued by hand.

use crate::fixed_point::{rounding_divide_by_pot, saturating_rounding_doubling_high_mul};
use crate::protocol::{Command, CommandProtocol, FnBinding};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Mismatches kept in a report unless configured otherwise.
pub const DEFAULT_MAX_REPORTED: usize = 10;

/// What the two bindings are expected to do on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relation {
    /// Results must be equal
    #[default]
    Identical,
    /// Results must differ
    Differs,
}

/// Operand ranges swept under one `(function_id, sub_function)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceCase {
    /// Protocol channel
    pub function_id: u8,
    /// Operation within the channel
    pub sub_function: u8,
    /// First operand range
    pub a: RangeInclusive<u32>,
    /// Second operand range
    pub b: RangeInclusive<u32>,
    /// Step through both ranges
    pub stride: u32,
    /// Expected relation between the two results
    pub relation: Relation,
}

impl EquivalenceCase {
    /// Exhaustive sweep over `a × b`, expecting identical results.
    pub fn new(
        function_id: u8,
        sub_function: u8,
        a: RangeInclusive<u32>,
        b: RangeInclusive<u32>,
    ) -> Self {
        Self { function_id, sub_function, a, b, stride: 1, relation: Relation::Identical }
    }

    /// A single command.
    pub fn single(command: Command) -> Self {
        Self::new(
            command.function_id,
            command.sub_function,
            command.a..=command.a,
            command.b..=command.b,
        )
    }

    /// Visit every `stride`-th operand on both axes.
    #[must_use]
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Set the expected relation.
    #[must_use]
    pub fn expecting(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    /// Commands this case expands to, `a` major.
    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        let step = self.stride as usize;
        self.a.clone().step_by(step).flat_map(move |a| {
            self.b
                .clone()
                .step_by(step)
                .map(move |b| Command::new(self.function_id, self.sub_function, a, b))
        })
    }
}

/// One command whose results broke the expected relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Position in the command stream
    pub index: usize,
    /// The offending command
    pub command: Command,
    /// Left binding result
    pub lhs: u32,
    /// Right binding result
    pub rhs: u32,
    /// Relation that was expected
    pub expected: Relation,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<6} {}  lhs=0x{:08x} rhs=0x{:08x}",
            self.index, self.command, self.lhs, self.rhs
        )?;
        if self.expected == Relation::Differs {
            write!(f, "  (expected to differ)")?;
        }
        Ok(())
    }
}

/// Outcome of a harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquivalenceReport {
    /// Commands issued to each binding
    pub tested: usize,
    /// Commands that broke their relation
    pub mismatch_count: usize,
    /// The first mismatches, in stream order
    pub mismatches: Vec<Mismatch>,
    max_reported: usize,
}

impl EquivalenceReport {
    fn with_limit(max_reported: usize) -> Self {
        Self { max_reported, ..Self::default() }
    }

    fn record(&mut self, command: Command, lhs: u32, rhs: u32, expected: Relation) {
        let index = self.tested;
        self.tested += 1;
        let holds = match expected {
            Relation::Identical => lhs == rhs,
            Relation::Differs => lhs != rhs,
        };
        if holds {
            return;
        }
        self.mismatch_count += 1;
        if self.mismatches.len() < self.max_reported {
            self.mismatches.push(Mismatch { index, command, lhs, rhs, expected });
        }
    }

    /// Append another report, renumbering its mismatches after ours.
    ///
    /// The merged report keeps the larger of the two mismatch limits, so an
    /// empty `Default` report can serve as the accumulator.
    pub fn merge(&mut self, other: Self) {
        self.max_reported = self.max_reported.max(other.max_reported);
        let room = self.max_reported.saturating_sub(self.mismatches.len());
        let offset = self.tested;
        self.mismatches.extend(other.mismatches.into_iter().take(room).map(|mut m| {
            m.index += offset;
            m
        }));
        self.tested += other.tested;
        self.mismatch_count += other.mismatch_count;
    }

    /// True when no command broke its relation.
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }
}

impl fmt::Display for EquivalenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} commands tested, {} mismatches", self.tested, self.mismatch_count)?;
        for m in &self.mismatches {
            writeln!(f, "  {m}")?;
        }
        let hidden = self.mismatch_count - self.mismatches.len();
        if hidden > 0 {
            writeln!(f, "  ... {hidden} more not shown")?;
        }
        write!(f, "{}", if self.passed() { "PASS" } else { "FAIL" })
    }
}

/// Runs command streams through two bindings and compares the results.
#[derive(Debug, Clone, Copy)]
pub struct EquivalenceHarness {
    max_reported: usize,
}

impl Default for EquivalenceHarness {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPORTED)
    }
}

impl EquivalenceHarness {
    /// Harness keeping at most `max_reported` mismatches per report.
    pub fn new(max_reported: usize) -> Self {
        Self { max_reported }
    }

    /// Issue one command on both bindings.
    pub fn run_one(
        &self,
        lhs: &mut (impl CommandProtocol + ?Sized),
        rhs: &mut (impl CommandProtocol + ?Sized),
        command: Command,
    ) -> (u32, u32) {
        (command.issue(lhs), command.issue(rhs))
    }

    /// Issue every command on both bindings, expecting identical results.
    pub fn run(
        &self,
        lhs: &mut (impl CommandProtocol + ?Sized),
        rhs: &mut (impl CommandProtocol + ?Sized),
        commands: impl IntoIterator<Item = Command>,
    ) -> EquivalenceReport {
        let mut report = EquivalenceReport::with_limit(self.max_reported);
        for command in commands {
            let (l, r) = self.run_one(lhs, rhs, command);
            report.record(command, l, r, Relation::Identical);
        }
        self.log(&*lhs, &*rhs, &report);
        report
    }

    /// Expand and run every case, honouring each case's relation.
    pub fn run_cases(
        &self,
        lhs: &mut (impl CommandProtocol + ?Sized),
        rhs: &mut (impl CommandProtocol + ?Sized),
        cases: &[EquivalenceCase],
    ) -> EquivalenceReport {
        let mut report = EquivalenceReport::with_limit(self.max_reported);
        for case in cases {
            for command in case.commands() {
                let (l, r) = self.run_one(lhs, rhs, command);
                report.record(command, l, r, case.relation);
            }
        }
        self.log(&*lhs, &*rhs, &report);
        report
    }

    fn log(
        &self,
        lhs: &(impl CommandProtocol + ?Sized),
        rhs: &(impl CommandProtocol + ?Sized),
        report: &EquivalenceReport,
    ) {
        if report.passed() {
            debug!(
                "{} vs {}: {} commands agree",
                lhs.binding_type(),
                rhs.binding_type(),
                report.tested
            );
        } else {
            info!(
                "{} vs {}: {} of {} commands mismatched",
                lhs.binding_type(),
                rhs.binding_type(),
                report.mismatch_count,
                report.tested
            );
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn reference_rdbpot(x: i32, exponent: u32) -> i32 {
    let x = i64::from(x);
    let d = 1_i64 << exponent;
    let q = x.div_euclid(d);
    let r = x.rem_euclid(d);
    // ties round away from zero
    let up = 2 * r > d || (2 * r == d && x >= 0);
    (q + i64::from(up)) as i32
}

#[allow(clippy::cast_possible_truncation)]
fn reference_srdhm(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let p = i128::from(a) * i128::from(b);
    let half = 1_i128 << 30;
    let r = if p >= 0 { (p + half) >> 31 } else { -((-p + half - 1) >> 31) };
    r as i32
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::needless_pass_by_value)]
fn reference_math_op(command: Command) -> u32 {
    match command.function_id {
        6 => reference_rdbpot(command.a as i32, command.b & 31) as u32,
        7 => reference_srdhm(command.a as i32, command.b as i32) as u32,
        _ => 0,
    }
}

/// Math channels computed with wide integer arithmetic, independent of
/// [`crate::fixed_point`]. Every other command answers 0.
pub fn reference_math() -> FnBinding<fn(Command) -> u32> {
    FnBinding::new("reference-math", reference_math_op as fn(Command) -> u32)
}

/// Check the crate's fixed-point kernels against the wide reference.
///
/// Bypasses the protocol entirely, for a degenerate single-channel comparison.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn check_fixed_point(harness: &EquivalenceHarness, commands: &[Command]) -> EquivalenceReport {
    let mut direct = FnBinding::new("fixed-point", |c: Command| match c.function_id {
        6 => rounding_divide_by_pot(c.a as i32, c.b & 31) as u32,
        7 => saturating_rounding_doubling_high_mul(c.a as i32, c.b as i32) as u32,
        _ => 0,
    });
    harness.run(&mut direct, &mut reference_math(), commands.iter().copied())
}

/// Reproducible command streams.
pub mod sweep {
    use crate::protocol::Command;
    use cfu_chip::funct;

    /// 64-bit linear congruential generator, high bits out.
    #[derive(Debug, Clone)]
    pub struct Lcg {
        state: i64,
    }

    impl Lcg {
        const A: i64 = 6_364_136_223_846_793_005;
        const C: i64 = 1_442_695_040_888_963_407;

        /// Generator starting from `seed`.
        #[allow(clippy::cast_possible_wrap)]
        pub fn new(seed: u64) -> Self {
            Self { state: seed as i64 }
        }

        /// Next value.
        #[allow(clippy::cast_possible_truncation)]
        pub fn next_i32(&mut self) -> i32 {
            self.state = self.state.wrapping_mul(Self::A).wrapping_add(Self::C);
            (self.state >> 28) as i32
        }

        /// Next value as an operand word.
        #[allow(clippy::cast_sign_loss)]
        pub fn next_u32(&mut self) -> u32 {
            self.next_i32() as u32
        }
    }

    /// Random `srdhm` operands on function 7.
    pub fn srdhm(count: usize, seed: u64) -> Vec<Command> {
        let mut rng = Lcg::new(seed);
        (0..count)
            .map(|_| {
                let a = rng.next_u32();
                let b = rng.next_u32();
                Command::new(funct::FN_SRDHM, 0, a, b)
            })
            .collect()
    }

    /// Random `rdbpot` operands on function 6, exponents in 0..=31.
    pub fn rdbpot(count: usize, seed: u64) -> Vec<Command> {
        let mut rng = Lcg::new(seed);
        (0..count)
            .map(|_| {
                let x = rng.next_u32();
                let exponent = rng.next_u32() & 0x1f;
                Command::new(funct::FN_RDBPOT, 0, x, exponent)
            })
            .collect()
    }

    /// Random `MACC4_EXPLICIT` operands, each preceded by an input-offset SET.
    ///
    /// Offsets are int8 values or 128, the range a quantized layer produces.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn macc4_explicit(count: usize, seed: u64) -> Vec<Command> {
        let mut rng = Lcg::new(seed);
        let mut commands = Vec::with_capacity(2 * count);
        for _ in 0..count {
            let input = rng.next_u32();
            let filter = rng.next_u32();
            let raw = rng.next_i32();
            let offset = if raw & 0x100 != 0 { 0x80 } else { i32::from(raw as i8) };
            commands.push(Command::control(funct::SET_INPUT_OFFSET, offset as u32, 0));
            commands.push(Command::control(funct::MACC4_EXPLICIT, input, filter));
        }
        commands
    }

    /// Extremal operands on every math channel and on `MACC4_EXPLICIT`.
    #[allow(clippy::cast_sign_loss)]
    pub fn fixed() -> Vec<Command> {
        const EDGES: [i32; 9] = [
            0,
            1,
            -1,
            2,
            i32::MIN,
            i32::MAX,
            1 << 30,
            -(1 << 30),
            0x7f7f_7f7f,
        ];
        const EXPONENTS: [u32; 6] = [0, 1, 2, 15, 30, 31];
        const LANES: [u32; 5] = [0, 0x7f7f_7f7f, 0x8080_8080, 0xffff_ffff, 0x017f_80ff];

        let mut commands = Vec::new();
        for &a in &EDGES {
            for &b in &EDGES {
                commands.push(Command::new(funct::FN_SRDHM, 0, a as u32, b as u32));
            }
            for &e in &EXPONENTS {
                commands.push(Command::new(funct::FN_RDBPOT, 0, a as u32, e));
            }
        }
        for offset in [0_i32, 1, -128, 127, 128] {
            commands.push(Command::control(funct::SET_INPUT_OFFSET, offset as u32, 0));
            for &input in &LANES {
                for &filter in &LANES {
                    commands.push(Command::control(funct::MACC4_EXPLICIT, input, filter));
                }
            }
        }
        commands
    }
}
