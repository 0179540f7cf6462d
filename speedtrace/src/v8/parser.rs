//! V8 log command interpreter.
//!
//! Commands understood:
//!
//! ```text
//! alias,newName,existingName
//! profiler,"compression",N | profiler,"begin" | profiler,"pause" | ...
//! code-creation,type,address,size,"name"
//! code-move,from,to
//! code-delete,address
//! tick,pc,sp,vmState[,frameAddress...]
//! repeat,N,<command...>
//! ```
//!
//! Addresses are `0x` hex, `0`-prefixed octal, bare hex, or a `+`/`-` hex
//! delta against the running base of the address tag they are parsed for.
//! Every parse for a tag stores the decoded address as that tag's new base.

use super::decompressor::{LogDecompressor, split_fields};
use super::symbols::{Symbol, SymbolTable, SymbolType};
use super::LogLineError;
use crate::profile::{JavaScriptProfile, ProfileNode, ProfileParser, ProfileType, VmState};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Alias,
    Profiler,
    CodeCreation,
    CodeMove,
    CodeDelete,
    Tick,
    Repeat,
}

/// Running base addresses for relative address decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressTag {
    Code,
    CodeMove,
    Stack,
    /// Frame addresses within one tick, chained from the tick's pc.
    Scratch,
}

/// Counters for conditions that are tolerated but worth knowing about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub lines: u64,
    pub ticks: u64,
    pub add_collisions: u64,
    pub remove_misses: u64,
    pub move_misses: u64,
    pub unknown_commands: u64,
    pub malformed_lines: u64,
}

/// Stateful interpreter for one session's V8 log stream.
#[derive(Debug, Clone)]
pub struct V8LogParser {
    actions: HashMap<String, Action>,
    symbol_types: HashMap<String, SymbolType>,
    symbols: SymbolTable,
    tags: HashMap<AddressTag, u64>,
    decompressor: Option<LogDecompressor>,
    stats: ParseStats,
}

impl V8LogParser {
    pub fn new() -> Self {
        let actions = [
            ("alias", Action::Alias),
            ("profiler", Action::Profiler),
            ("code-creation", Action::CodeCreation),
            ("code-move", Action::CodeMove),
            ("code-delete", Action::CodeDelete),
            ("tick", Action::Tick),
            ("repeat", Action::Repeat),
            // Short forms used by compressed logs.
            ("cc", Action::CodeCreation),
            ("cm", Action::CodeMove),
            ("cd", Action::CodeDelete),
            ("t", Action::Tick),
            ("r", Action::Repeat),
        ]
        .into_iter()
        .map(|(name, action)| (name.to_string(), action))
        .collect();

        let symbol_types = SymbolType::ALL
            .into_iter()
            .map(|t| (t.as_str().to_string(), t))
            .collect();

        let mut parser = Self {
            actions,
            symbol_types,
            symbols: SymbolTable::new(),
            tags: HashMap::new(),
            decompressor: None,
            stats: ParseStats::default(),
        };
        parser.reset_tags();
        parser
    }

    fn reset_tags(&mut self) {
        for tag in [AddressTag::Code, AddressTag::CodeMove, AddressTag::Stack] {
            self.tags.insert(tag, 0);
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn tag(&self, tag: AddressTag) -> u64 {
        self.tags.get(&tag).copied().unwrap_or(0)
    }

    /// Feeds a block of newline separated log text into `profile`.
    pub fn parse_log(&mut self, data: &str, profile: &mut JavaScriptProfile) {
        for line in data.lines() {
            self.process_line(line, profile);
        }
    }

    /// Decompresses, splits and runs one log line. Bad lines are logged and
    /// skipped.
    pub fn process_line(&mut self, line: &str, profile: &mut JavaScriptProfile) {
        self.stats.lines += 1;

        let line = match self.decompressor.as_mut() {
            Some(decompressor) if !line.is_empty() => match decompressor.decompress(line) {
                Ok(expanded) => expanded,
                Err(e) => {
                    self.stats.malformed_lines += 1;
                    tracing::warn!(line, error = %e, "skipping v8 log line");
                    return;
                }
            },
            _ => line.to_string(),
        };

        let fields = split_fields(&line);
        if let Err(e) = self.run(&fields, profile) {
            self.stats.malformed_lines += 1;
            tracing::warn!(line = %line, error = %e, "skipping v8 log line");
        }
    }

    fn run(&mut self, fields: &[String], profile: &mut JavaScriptProfile) -> Result<(), LogLineError> {
        let Some(command) = fields.first() else {
            return Ok(());
        };
        if command.is_empty() {
            return Ok(());
        }

        match self.actions.get(command.as_str()).copied() {
            Some(Action::Alias) => self.alias(fields),
            Some(Action::Profiler) => self.profiler(fields),
            Some(Action::CodeCreation) => self.code_creation(fields),
            Some(Action::CodeMove) => self.code_move(fields),
            Some(Action::CodeDelete) => self.code_delete(fields),
            Some(Action::Tick) => self.tick(fields, profile),
            Some(Action::Repeat) => self.repeat(fields, profile),
            None => {
                self.stats.unknown_commands += 1;
                tracing::warn!(command = %command, "unknown v8 profiler command");
                Ok(())
            }
        }
    }

    /// Decodes an address, updating the tag's running base.
    pub fn parse_address(&mut self, text: &str, tag: Option<AddressTag>) -> Result<u64, LogLineError> {
        if text == "overflow" {
            return Ok(0);
        }

        let bad = || LogLineError::BadAddress(text.to_string());
        let hex = |digits: &str| u64::from_str_radix(digits, 16).map_err(|_| bad());
        let base = tag.map_or(0, |t| self.tag(t));

        let address = if let Some(digits) = text.strip_prefix("0x") {
            hex(digits)?
        } else if let Some(delta) = text.strip_prefix('+') {
            base.wrapping_add(hex(delta)?)
        } else if let Some(delta) = text.strip_prefix('-') {
            base.wrapping_sub(hex(delta)?)
        } else if text.starts_with('0') {
            u64::from_str_radix(text, 8).map_err(|_| bad())?
        } else {
            hex(text)?
        };

        if let Some(tag) = tag {
            self.tags.insert(tag, address);
        }
        Ok(address)
    }

    fn alias(&mut self, fields: &[String]) -> Result<(), LogLineError> {
        expect_fields("alias", fields, 3)?;
        let (alias, original) = (&fields[1], &fields[2]);

        if let Some(symbol_type) = self.symbol_types.get(original).copied() {
            self.symbol_types.insert(alias.clone(), symbol_type);
        } else if let Some(action) = self.actions.get(original).copied() {
            self.actions.insert(alias.clone(), action);
        } else {
            tracing::warn!(alias = %alias, original = %original, "unable to find command to match alias");
        }
        Ok(())
    }

    fn profiler(&mut self, fields: &[String]) -> Result<(), LogLineError> {
        expect_fields("profiler", fields, 2)?;
        match fields[1].as_str() {
            "compression" => {
                expect_fields("profiler", fields, 3)?;
                let window = parse_number::<usize>(&fields[2])?;
                self.decompressor = Some(LogDecompressor::new(window));
            }
            "begin" => self.reset_tags(),
            "pause" | "resume" => {}
            _ => tracing::debug!(line = %fields.join(","), "ignoring profiler command"),
        }
        Ok(())
    }

    fn code_creation(&mut self, fields: &[String]) -> Result<(), LogLineError> {
        expect_fields("code-creation", fields, 5)?;
        let symbol_type = self.symbol_types.get(&fields[1]).copied();
        if symbol_type.is_none() {
            tracing::debug!(symbol_type = %fields[1], "unknown v8 symbol type");
        }
        let address = self.parse_address(&fields[2], Some(AddressTag::Code))?;
        let size = parse_number::<u64>(&fields[3])?;

        let symbol = Symbol::new(fields[4].clone(), symbol_type, address, size);
        if self.symbols.add(symbol) {
            self.stats.add_collisions += 1;
        }
        Ok(())
    }

    fn code_move(&mut self, fields: &[String]) -> Result<(), LogLineError> {
        expect_fields("code-move", fields, 3)?;
        let from = self.parse_address(&fields[1], Some(AddressTag::Code))?;
        let to = self.parse_address(&fields[2], Some(AddressTag::CodeMove))?;
        if !self.symbols.move_symbol(from, to) {
            self.stats.move_misses += 1;
        }
        Ok(())
    }

    fn code_delete(&mut self, fields: &[String]) -> Result<(), LogLineError> {
        expect_fields("code-delete", fields, 2)?;
        let address = self.parse_address(&fields[1], Some(AddressTag::Code))?;
        if self.symbols.remove(address).is_none() {
            self.stats.remove_misses += 1;
        }
        Ok(())
    }

    fn repeat(&mut self, fields: &[String], profile: &mut JavaScriptProfile) -> Result<(), LogLineError> {
        expect_fields("repeat", fields, 3)?;
        let count = parse_number::<u64>(&fields[1])?;
        for _ in 0..count {
            self.run(&fields[2..], profile)?;
        }
        Ok(())
    }

    fn tick(&mut self, fields: &[String], profile: &mut JavaScriptProfile) -> Result<(), LogLineError> {
        expect_fields("tick", fields, 4)?;
        let pc = self.parse_address(&fields[1], Some(AddressTag::Code))?;
        self.parse_address(&fields[2], Some(AddressTag::Stack))?;
        let state = VmState::from_code(parse_number::<i64>(&fields[3])?);

        let mut addresses = vec![pc];
        self.tags.insert(AddressTag::Scratch, pc);
        for field in &fields[4..] {
            addresses.push(self.parse_address(field, Some(AddressTag::Scratch))?);
        }

        let frames: Vec<(&str, Option<SymbolType>)> = addresses
            .iter()
            .filter_map(|address| self.symbols.lookup(*address))
            .map(|symbol| {
                let name = if symbol.name.is_empty() {
                    "(unknown)"
                } else {
                    symbol.name.as_str()
                };
                (name, symbol.symbol_type)
            })
            .collect();

        profile.add_state_time(state, 1.0);
        record_flat(profile.get_or_create_profile(ProfileType::Flat), &frames, state);
        record_path(
            profile.get_or_create_profile(ProfileType::BottomUp),
            &frames,
            0,
            state,
        );
        let callers_first: Vec<_> = frames.iter().rev().copied().collect();
        record_path(
            profile.get_or_create_profile(ProfileType::TopDown),
            &callers_first,
            callers_first.len().saturating_sub(1),
            state,
        );

        self.stats.ticks += 1;
        Ok(())
    }
}

impl Default for V8LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileParser for V8LogParser {
    fn parse(&mut self, data: &str, profile: &mut JavaScriptProfile) {
        self.parse_log(data, profile);
        tracing::debug!(stats = ?self.stats, symbols = self.symbols.len(), "parsed v8 profile data");
    }
}

fn expect_fields(command: &str, fields: &[String], expected: usize) -> Result<(), LogLineError> {
    if fields.len() < expected {
        return Err(LogLineError::MissingFields {
            command: command.to_string(),
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, LogLineError> {
    text.parse()
        .map_err(|_| LogLineError::BadNumber(text.to_string()))
}

fn record_unknown(root: &mut ProfileNode, state: VmState) {
    root.get_or_insert_child(&format!("unknown - {}", state.as_str()), None)
        .add_self_time(1.0);
}

/// Walks down from `root` along `frames`. The frame at `self_index` gets
/// self time, the rest get total time.
fn record_path(
    root: &mut ProfileNode,
    frames: &[(&str, Option<SymbolType>)],
    self_index: usize,
    state: VmState,
) {
    root.add_time(1.0);
    if frames.is_empty() {
        record_unknown(root, state);
        return;
    }

    let mut node = root;
    for (i, (name, symbol_type)) in frames.iter().enumerate() {
        let child = node.get_or_insert_child(name, *symbol_type);
        if i == self_index {
            child.add_self_time(1.0);
        } else {
            child.add_time(1.0);
        }
        node = child;
    }
}

/// Every frame directly under the root, counted once per tick.
fn record_flat(root: &mut ProfileNode, frames: &[(&str, Option<SymbolType>)], state: VmState) {
    root.add_time(1.0);
    if frames.is_empty() {
        record_unknown(root, state);
        return;
    }

    let mut seen = HashSet::new();
    for (i, (name, symbol_type)) in frames.iter().enumerate() {
        if !seen.insert(*name) {
            continue;
        }
        let child = root.get_or_insert_child(name, *symbol_type);
        if i == 0 {
            child.add_self_time(1.0);
        } else {
            child.add_time(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_SET_1: &str = r#"code-creation,LazyCompile,0x100,10,"parentNode"
code-creation,LazyCompile,0x200,10,"child1"
code-creation,LazyCompile,0x300,10,"child2"
tick,0x100,+1,0
tick,0x200,+1,0,0x100
tick,0x200,+1,0,0x100
tick,0x300,+1,0,0x200,0x100
tick,0x300,+1,0,0x200,0x100
tick,0x300,+1,0,0x200,0x100
"#;

    fn parse(data: &str) -> (V8LogParser, JavaScriptProfile) {
        let mut parser = V8LogParser::new();
        let mut profile = JavaScriptProfile::new();
        parser.parse_log(data, &mut profile);
        (parser, profile)
    }

    fn times(node: &ProfileNode) -> (f64, f64) {
        (node.time, node.self_time)
    }

    #[test]
    fn address_parsing() {
        let mut parser = V8LogParser::new();
        let code = Some(AddressTag::Code);
        assert_eq!(parser.parse_address("0x100", code).unwrap(), 0x100);
        assert_eq!(parser.parse_address("+200", code).unwrap(), 0x300);
        assert_eq!(parser.parse_address("-100", code).unwrap(), 0x200);
        assert_eq!(parser.parse_address("0100", None).unwrap(), 0o100);
        assert_eq!(parser.parse_address("5910913e", None).unwrap(), 0x5910_913e);
        assert_eq!(parser.parse_address("overflow", code).unwrap(), 0);
        assert_eq!(parser.tag(AddressTag::Code), 0x200);
        assert!(matches!(
            parser.parse_address("+zz", code),
            Err(LogLineError::BadAddress(_))
        ));
    }

    #[test]
    fn tags_keep_separate_bases() {
        let mut parser = V8LogParser::new();
        parser.parse_address("0x1000", Some(AddressTag::Code)).unwrap();
        parser.parse_address("0x50", Some(AddressTag::Stack)).unwrap();
        assert_eq!(parser.parse_address("+8", Some(AddressTag::Stack)).unwrap(), 0x58);
        assert_eq!(parser.parse_address("+8", Some(AddressTag::Code)).unwrap(), 0x1008);
        assert_eq!(parser.parse_address("+8", None).unwrap(), 0x8);
    }

    #[test]
    fn tick_delta_resolves_against_code_creation() {
        let data = "code-creation,Function,0x1000,10,\"a\"\ntick,+a,+1,0\n";
        let (parser, profile) = parse(data);
        assert_eq!(parser.tag(AddressTag::Code), 0x100a);
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(times(root.child("a").unwrap()), (1.0, 1.0));
    }

    #[test]
    fn simple_tick() {
        let data = "code-creation,LoadIC,5910913e,179,\"parentNode\"\ntick,5910913e,+1,0\n";
        let (_, profile) = parse(data);
        assert_eq!(profile.total_time(), 1.0);
        for profile_type in [ProfileType::BottomUp, ProfileType::Flat, ProfileType::TopDown] {
            let root = profile.profile(profile_type).unwrap();
            assert_eq!(root.children.len(), 1);
            let child = &root.children[0];
            assert_eq!(child.symbol_name, "parentNode");
            assert_eq!(child.symbol_type, Some(SymbolType::LoadIC));
            assert_eq!(times(child), (1.0, 1.0));
        }
        assert_eq!(profile.state_time(VmState::JavaScript), 1.0);
    }

    #[test]
    fn repeated_ticks_accumulate() {
        let data = "code-creation,LoadIC,5910913e,179,\"parentNode\"\nrepeat,5,tick,5910913e,+1,0\n";
        let (_, profile) = parse(data);
        assert_eq!(profile.total_time(), 5.0);
        let flat = profile.profile(ProfileType::Flat).unwrap();
        assert_eq!(flat.children.len(), 1);
        assert_eq!(times(&flat.children[0]), (5.0, 5.0));
    }

    #[test]
    fn repeat_with_short_tick_form() {
        let data = "code-creation,Function,0x2000,16,\"foo\"\nrepeat,5,t,0x2004,+1,0\n";
        let (_, profile) = parse(data);
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(root.child("foo").unwrap().self_time, 5.0);
    }

    #[test]
    fn bottom_up_shape() {
        let (_, profile) = parse(DATA_SET_1);
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(root.time, 6.0);
        assert_eq!(root.children.len(), 3);

        let parent = root.child("parentNode").unwrap();
        assert_eq!(times(parent), (1.0, 1.0));
        assert!(parent.children.is_empty());

        let child1 = root.child("child1").unwrap();
        assert_eq!(times(child1), (2.0, 2.0));
        assert_eq!(times(child1.child("parentNode").unwrap()), (2.0, 0.0));

        let child2 = root.child("child2").unwrap();
        assert_eq!(times(child2), (3.0, 3.0));
        let caller = child2.child("child1").unwrap();
        assert_eq!(times(caller), (3.0, 0.0));
        assert_eq!(times(caller.child("parentNode").unwrap()), (3.0, 0.0));
    }

    #[test]
    fn flat_shape() {
        let (_, profile) = parse(DATA_SET_1);
        let mut root = profile.profile(ProfileType::Flat).unwrap().clone();
        root.sort_by_time();
        let rows: Vec<(&str, f64, f64)> = root
            .children
            .iter()
            .map(|c| (c.symbol_name.as_str(), c.self_time, c.time))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("child2", 3.0, 3.0),
                ("child1", 2.0, 5.0),
                ("parentNode", 1.0, 6.0)
            ]
        );
    }

    #[test]
    fn top_down_shape() {
        let (_, profile) = parse(DATA_SET_1);
        let root = profile.profile(ProfileType::TopDown).unwrap();
        assert_eq!(root.time, 6.0);
        assert_eq!(root.children.len(), 1);

        let parent = &root.children[0];
        assert_eq!(parent.symbol_name, "parentNode");
        assert_eq!(times(parent), (6.0, 1.0));

        let child1 = parent.child("child1").unwrap();
        assert_eq!(times(child1), (5.0, 2.0));
        let child2 = child1.child("child2").unwrap();
        assert_eq!(times(child2), (3.0, 3.0));
        assert!(child2.children.is_empty());
    }

    #[test]
    fn flat_counts_recursion_once() {
        let data = "code-creation,Function,0x100,10,\"fib\"\ntick,0x100,+1,0,0x100,0x100\n";
        let (_, profile) = parse(data);
        let flat = profile.profile(ProfileType::Flat).unwrap();
        assert_eq!(times(flat.child("fib").unwrap()), (1.0, 1.0));
        let bottom_up = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(bottom_up.child("fib").unwrap().child("fib").unwrap().time, 1.0);
    }

    #[test]
    fn unresolved_ticks_go_to_unknown_bucket() {
        let (parser, profile) = parse("tick,0x999,+1,1\ntick,0x999,+1,1\n");
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(times(root.child("unknown - Garbage Collection").unwrap()), (2.0, 2.0));
        assert_eq!(profile.state_time(VmState::GarbageCollection), 2.0);
        assert_eq!(parser.stats().ticks, 2);
    }

    #[test]
    fn aliases_only_yield_empty_profile() {
        let data = "profiler,\"begin\",1\nalias,cc,code-creation\nalias,lic,LoadIC\nalias,x,nothing\n";
        let (parser, profile) = parse(data);
        assert_eq!(profile.total_time(), 0.0);
        assert!(profile.profile(ProfileType::BottomUp).is_none());
        assert_eq!(parser.stats().malformed_lines, 0);
    }

    #[test]
    fn symbol_type_alias_applies() {
        let data = "alias,lic,LoadIC\nalias,tk,tick\ncode-creation,lic,0x10,4,\"get\"\ntk,0x11,+1,0\n";
        let (_, profile) = parse(data);
        let root = profile.profile(ProfileType::Flat).unwrap();
        assert_eq!(root.child("get").unwrap().symbol_type, Some(SymbolType::LoadIC));
    }

    #[test]
    fn code_move_and_delete() {
        let data = r#"code-creation,Function,0x100,10,"moved"
code-move,0x100,0x800
tick,0x805,+1,0
code-delete,0x800
tick,0x805,+1,0
code-delete,0x800
code-move,0x100,0x900
"#;
        let (parser, profile) = parse(data);
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(root.child("moved").unwrap().self_time, 1.0);
        assert_eq!(root.child("unknown - JavaScript").unwrap().self_time, 1.0);
        assert_eq!(parser.stats().remove_misses, 1);
        assert_eq!(parser.stats().move_misses, 1);
        assert!(parser.symbols().is_empty());
    }

    #[test]
    fn collisions_are_counted() {
        let data = "code-creation,Stub,0x100,10,\"a\"\ncode-creation,Stub,0x104,10,\"b\"\n";
        let (parser, _) = parse(data);
        assert_eq!(parser.stats().add_collisions, 1);
        assert_eq!(parser.symbols().lookup(0x104).unwrap().name, "b");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let data = r#"code-creation,Function,0x100,10,"ok"
bogus,1,2
tick,0xZZ,+1,0
code-creation,Function
tick,0x100,+1,0
"#;
        let (parser, profile) = parse(data);
        assert_eq!(profile.total_time(), 1.0);
        assert_eq!(parser.stats().unknown_commands, 1);
        assert_eq!(parser.stats().malformed_lines, 2);
    }

    #[test]
    fn compressed_log() {
        let data = r#"profiler,"compression",4
code-creation,LazyCompile,0x100,10,"parentNode"
tick,0x100,+1,0
#1
repeat,2,#2
"#;
        let (parser, profile) = parse(data);
        let root = profile.profile(ProfileType::BottomUp).unwrap();
        assert_eq!(times(root.child("parentNode").unwrap()), (4.0, 4.0));
        assert_eq!(parser.stats().ticks, 4);
    }
}
