//! G-code to motion command translation
//!
//! Translation is a pure function of a G-code record and the modal context
//! it runs in (position, active feed, distance mode). Whole programs are
//! planned up front so every translation error surfaces before the first
//! command reaches the hardware.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Axis, CncMachine, GCode, MotionCommand, Position};

// ─────────────────────────────────────────────────────────────────
// Translation Context
// ─────────────────────────────────────────────────────────────────

/// How axis words are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// G90
    Absolute,
    /// G91
    Incremental,
}

impl Default for DistanceMode {
    fn default() -> Self {
        DistanceMode::Absolute
    }
}

/// Modal state a record is translated against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationContext {
    pub position: Position,
    /// Active feed rate (0 = none set)
    pub speed: u32,
    pub max_speed: u32,
    pub distance_mode: DistanceMode,
}

impl TranslationContext {
    /// Context starting from a machine's confirmed state
    pub fn from_machine(machine: &CncMachine) -> Self {
        Self {
            position: machine.current_position,
            speed: machine.speed,
            max_speed: machine.max_speed,
            distance_mode: DistanceMode::Absolute,
        }
    }
}

/// Commands for one record plus the context after it
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub commands: Vec<MotionCommand>,
    pub context: TranslationContext,
}

/// Command groups for a whole program, one group per record
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<Vec<MotionCommand>>,
    /// Context expected after the last step
    pub context: TranslationContext,
}

impl Plan {
    /// Total number of motion commands
    pub fn command_count(&self) -> usize {
        self.steps.iter().map(Vec::len).sum()
    }
}

/// Translation failure inside a program
#[derive(Debug)]
pub struct PlanError {
    /// Index of the offending record
    pub index: usize,
    pub error: Error,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gcode #{}: {}", self.index, self.error)
    }
}

// ─────────────────────────────────────────────────────────────────
// Recognised Commands
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Rapid,
    Linear,
    Home,
    Absolute,
    Incremental,
    Feed,
    ToolChange,
}

/// Parse a command token; leading zeros are optional (G1 == G01)
fn parse_op(command: &str) -> Option<Op> {
    if command == "F" {
        return Some(Op::Feed);
    }
    let mut chars = command.chars();
    let letter = chars.next()?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    match (letter, number) {
        ('G', 0) => Some(Op::Rapid),
        ('G', 1) => Some(Op::Linear),
        ('G', 28) => Some(Op::Home),
        ('G', 90) => Some(Op::Absolute),
        ('G', 91) => Some(Op::Incremental),
        ('M', 6) => Some(Op::ToolChange),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────
// Translator
// ─────────────────────────────────────────────────────────────────

/// Maps G-code records onto primitive motion commands
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTranslator;

impl CommandTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate one record
    pub fn translate(&self, gcode: &GCode, context: &TranslationContext) -> Result<Translation> {
        let op = parse_op(gcode.command()).ok_or_else(|| Error::UnsupportedCommand {
            command: gcode.command().to_string(),
        })?;

        let mut next = *context;
        let mut commands = Vec::new();

        match op {
            Op::Absolute => next.distance_mode = DistanceMode::Absolute,
            Op::Incremental => next.distance_mode = DistanceMode::Incremental,
            Op::Feed => {
                let feed = feed_rate(gcode, context.max_speed)?
                    .ok_or_else(|| Error::invalid_parameter(gcode.command(), "f", "required"))?;
                next.speed = feed;
                commands.push(MotionCommand::SetSpeed { speed: feed });
            }
            Op::Rapid => {
                let target = resolve_target(gcode, context)?
                    .ok_or_else(|| Error::invalid_parameter(gcode.command(), "x|y|z", "no axis given"))?;
                next.position = target;
                commands.push(MotionCommand::MoveTo {
                    target,
                    speed: context.max_speed,
                });
            }
            Op::Linear => {
                if let Some(feed) = feed_rate(gcode, context.max_speed)? {
                    next.speed = feed;
                    commands.push(MotionCommand::SetSpeed { speed: feed });
                }
                match resolve_target(gcode, context)? {
                    Some(target) => {
                        if next.speed == 0 {
                            return Err(Error::invalid_parameter(
                                gcode.command(),
                                "f",
                                "no feed rate active",
                            ));
                        }
                        next.position = target;
                        commands.push(MotionCommand::MoveTo {
                            target,
                            speed: next.speed,
                        });
                    }
                    None if commands.is_empty() => {
                        return Err(Error::invalid_parameter(
                            gcode.command(),
                            "x|y|z",
                            "no axis given",
                        ));
                    }
                    None => {}
                }
            }
            Op::Home => {
                let listed: Vec<Axis> = Axis::all()
                    .iter()
                    .copied()
                    .filter(|a| gcode.param(a.key()).is_some())
                    .collect();
                let target = if listed.is_empty() {
                    Position::ORIGIN
                } else {
                    listed
                        .iter()
                        .fold(context.position, |p, &a| p.with_axis(a, 0.0))
                };
                next.position = target;
                commands.push(MotionCommand::MoveTo {
                    target,
                    speed: context.max_speed,
                });
            }
            Op::ToolChange => {
                let tool_id = gcode
                    .param("tool")
                    .or_else(|| gcode.param("t"))
                    .map(|v| v.as_text())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::invalid_parameter(gcode.command(), "tool", "required"))?;
                commands.push(MotionCommand::ChangeTool { tool_id });
            }
        }

        Ok(Translation { commands, context: next })
    }

    /// Translate a whole program against a starting context
    pub fn plan(
        &self,
        program: &[GCode],
        start: TranslationContext,
    ) -> std::result::Result<Plan, PlanError> {
        let mut context = start;
        let mut steps = Vec::with_capacity(program.len());
        for (index, gcode) in program.iter().enumerate() {
            let translation = self
                .translate(gcode, &context)
                .map_err(|error| PlanError { index, error })?;
            context = translation.context;
            steps.push(translation.commands);
        }
        Ok(Plan { steps, context })
    }
}

/// Optional `f` word, validated against the machine maximum
fn feed_rate(gcode: &GCode, max_speed: u32) -> Result<Option<u32>> {
    let Some(value) = gcode.param("f") else {
        return Ok(None);
    };
    let feed = value
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| Error::invalid_parameter(gcode.command(), "f", format!("not a number: {}", value)))?;
    if feed.fract() != 0.0 {
        return Err(Error::invalid_parameter(
            gcode.command(),
            "f",
            format!("{} is not a whole feed rate", feed),
        ));
    }
    if feed < 1.0 {
        return Err(Error::invalid_parameter(gcode.command(), "f", "must be greater than 0"));
    }
    if feed > max_speed as f64 {
        return Err(Error::invalid_parameter(
            gcode.command(),
            "f",
            format!("{} exceeds machine maximum {}", feed, max_speed),
        ));
    }
    Ok(Some(feed as u32))
}

/// Target from axis words; `None` when no axis is given
fn resolve_target(gcode: &GCode, context: &TranslationContext) -> Result<Option<Position>> {
    let mut target = context.position;
    let mut any = false;
    for &axis in Axis::all() {
        let Some(value) = gcode.param(axis.key()) else {
            continue;
        };
        let v = value.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
            Error::invalid_parameter(gcode.command(), axis.key(), format!("not a number: {}", value))
        })?;
        let coordinate = match context.distance_mode {
            DistanceMode::Absolute => v,
            DistanceMode::Incremental => context.position.axis(axis) + v,
        };
        target = target.with_axis(axis, coordinate);
        any = true;
    }
    Ok(any.then_some(target))
}
