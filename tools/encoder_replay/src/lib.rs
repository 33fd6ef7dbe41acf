use std::{fmt, fs, path::Path, sync::Mutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use hold_step_rotate::{
    ActiveLayers, BindingAction, BindingQueue, DirectionHoldMode, HoldStepConfig,
    HoldStepTranslator, IneligibleTick, KeyBinding, KeyStateChanged, KeyUsage, LayerMask,
    LayerPolicy, ProcessMode, QuickReleaseConfig, QuickReleaseListener, RawSample,
    TimeoutScheduler, TranslatorRegistry, DEFAULT_STEP_GROUP_SIZE, DEFAULT_TIMEOUT_MS,
};
use serde::Deserialize;

pub const REPLAY_ENCODERS: usize = 4;
pub const REPLAY_LAYERS: usize = 8;

const TRACE_HEADER: &str = "kind,ms,a,b,c,d";

type ReplayTranslator<'a> =
    HoldStepTranslator<'a, CriticalSectionRawMutex, REPLAY_ENCODERS, REPLAY_LAYERS>;

#[derive(Debug)]
pub enum ReplayError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for ReplayError {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfigFile {
    pub translator: TranslatorSection,
    #[serde(default)]
    pub bindings: BindingsSection,
    #[serde(default)]
    pub quick_release: QuickReleaseSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslatorSection {
    pub name: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u16,
    #[serde(default = "default_step_group_size")]
    pub step_group_size: u16,
    #[serde(default)]
    pub direction_hold_mode: HoldModeName,
    #[serde(default)]
    pub require_top_layer: bool,
    #[serde(default)]
    pub allowed_layers: Vec<u8>,
    #[serde(default)]
    pub sensor_position_base: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldModeName {
    #[default]
    Switch,
    Sticky,
}

/// Keyboard-page usage ids; a missing entry leaves that binding unset.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingsSection {
    pub hold_cw: Option<u16>,
    pub hold_ccw: Option<u16>,
    pub step_cw: Option<u16>,
    pub step_ccw: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickReleaseSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_list: Vec<u16>,
}

fn default_timeout_ms() -> u16 {
    DEFAULT_TIMEOUT_MS
}

fn default_step_group_size() -> u16 {
    DEFAULT_STEP_GROUP_SIZE
}

pub fn parse_config_str(text: &str) -> Result<ReplayConfigFile, ReplayError> {
    toml::from_str(text).map_err(|e| ReplayError::Parse(e.to_string()))
}

pub fn validate_config(file: &ReplayConfigFile) -> Result<(), ReplayError> {
    let translator = &file.translator;
    if translator.name.trim().is_empty() {
        return Err(ReplayError::Validation(
            "translator.name must not be empty".into(),
        ));
    }
    if let Some(layer) = translator.allowed_layers.iter().find(|layer| **layer >= 32) {
        return Err(ReplayError::Validation(format!(
            "translator.allowed_layers entries must be < 32, got {layer}"
        )));
    }
    if translator.require_top_layer && !translator.allowed_layers.is_empty() {
        return Err(ReplayError::Validation(
            "translator.allowed_layers cannot be combined with require_top_layer".into(),
        ));
    }

    let quick = &file.quick_release;
    if !quick.enabled && !quick.allow_list.is_empty() {
        return Err(ReplayError::Validation(
            "quick_release.allow_list requires quick_release.enabled".into(),
        ));
    }
    if let Some(id) = quick
        .allow_list
        .iter()
        .find(|id| KeyUsage::keyboard(**id).is_modifier())
    {
        return Err(ReplayError::Validation(format!(
            "quick_release.allow_list entry {id:#04x} is a modifier and cannot quick-release"
        )));
    }
    Ok(())
}

/// Builds the runtime descriptor. The allow list is leaked: a replay process
/// owns exactly one config for its whole lifetime.
pub fn build_config(file: &ReplayConfigFile) -> HoldStepConfig {
    let key = |id: Option<u16>| id.map(|id| KeyBinding::key_press(KeyUsage::keyboard(id)));
    let bindings = &file.bindings;
    let translator = &file.translator;

    let mode = match translator.direction_hold_mode {
        HoldModeName::Switch => DirectionHoldMode::Switch,
        HoldModeName::Sticky => DirectionHoldMode::Sticky,
    };
    let mask = translator
        .allowed_layers
        .iter()
        .fold(LayerMask::UNRESTRICTED, |mask, layer| mask.with_layer(*layer));

    let quick_release = if file.quick_release.enabled {
        let allow_list: Vec<KeyUsage> = file
            .quick_release
            .allow_list
            .iter()
            .map(|id| KeyUsage::keyboard(*id))
            .collect();
        QuickReleaseConfig::enabled(Box::leak(allow_list.into_boxed_slice()))
    } else {
        QuickReleaseConfig::DISABLED
    };

    HoldStepConfig::new(
        key(bindings.hold_cw),
        key(bindings.hold_ccw),
        key(bindings.step_cw),
        key(bindings.step_ccw),
    )
    .with_timeout_ms(translator.timeout_ms)
    .with_step_group_size(translator.step_group_size)
    .with_direction_hold_mode(mode)
    .with_layer_policy(LayerPolicy::from_parts(translator.require_top_layer, mask.bits()))
    .with_quick_release(quick_release)
    .with_sensor_position_base(translator.sensor_position_base)
}

pub fn load_config(path: &Path) -> Result<(String, HoldStepConfig), ReplayError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ReplayError::Io(format!("failed to read {}: {e}", path.display())))?;
    let file = parse_config_str(&text)?;
    validate_config(&file)?;
    Ok((file.translator.name.clone(), build_config(&file)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Tick {
        ms: u64,
        encoder: usize,
        layer: u8,
        sample: RawSample,
    },
    Key {
        ms: u64,
        usage: KeyUsage,
        pressed: bool,
    },
    Layer {
        ms: u64,
        layer: u8,
        active: bool,
    },
}

impl TraceEvent {
    pub fn ms(&self) -> u64 {
        match self {
            Self::Tick { ms, .. } | Self::Key { ms, .. } | Self::Layer { ms, .. } => *ms,
        }
    }
}

/// Parses `tick,ms,encoder,layer,major,minor`, `key,ms,usage_id,0|1` and
/// `layer,ms,layer,on|off` lines. Blank lines and `#` comments are skipped.
pub fn parse_trace_str(text: &str) -> Result<Vec<TraceEvent>, ReplayError> {
    let mut out: Vec<TraceEvent> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed == TRACE_HEADER {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let event = match parts.as_slice() {
            ["tick", ms, encoder, layer, major, minor] => TraceEvent::Tick {
                ms: parse_field(ms, line_no, "ms")?,
                encoder: parse_field(encoder, line_no, "encoder")?,
                layer: parse_field(layer, line_no, "layer")?,
                sample: RawSample::new(
                    parse_field(major, line_no, "major")?,
                    parse_field(minor, line_no, "minor")?,
                ),
            },
            ["key", ms, id, pressed] => TraceEvent::Key {
                ms: parse_field(ms, line_no, "ms")?,
                usage: KeyUsage::keyboard(parse_usage_id(id, line_no)?),
                pressed: parse_flag(pressed, line_no, "1", "0")?,
            },
            ["layer", ms, layer, state] => TraceEvent::Layer {
                ms: parse_field(ms, line_no, "ms")?,
                layer: parse_field(layer, line_no, "layer")?,
                active: parse_flag(state, line_no, "on", "off")?,
            },
            _ => {
                return Err(ReplayError::Parse(format!(
                    "line {line_no}: unrecognized trace line `{trimmed}`"
                )))
            }
        };

        validate_event(&event, out.last(), line_no)?;
        out.push(event);
    }
    Ok(out)
}

pub fn parse_trace(path: &Path) -> Result<Vec<TraceEvent>, ReplayError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ReplayError::Io(format!("failed to read {}: {e}", path.display())))?;
    parse_trace_str(&text)
}

fn validate_event(
    event: &TraceEvent,
    previous: Option<&TraceEvent>,
    line_no: usize,
) -> Result<(), ReplayError> {
    if previous.is_some_and(|previous| previous.ms() > event.ms()) {
        return Err(ReplayError::Validation(format!(
            "line {line_no}: timestamps must not go backwards"
        )));
    }
    match *event {
        TraceEvent::Tick { encoder, .. } if encoder >= REPLAY_ENCODERS => {
            Err(ReplayError::Validation(format!(
                "line {line_no}: encoder must be < {REPLAY_ENCODERS}"
            )))
        }
        TraceEvent::Tick { layer, .. } | TraceEvent::Layer { layer, .. }
            if layer as usize >= REPLAY_LAYERS =>
        {
            Err(ReplayError::Validation(format!(
                "line {line_no}: layer must be < {REPLAY_LAYERS}"
            )))
        }
        _ => Ok(()),
    }
}

fn parse_field<T>(raw: &str, line_no: usize, field: &str) -> Result<T, ReplayError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ReplayError::Parse(format!("line {line_no}: invalid {field} '{raw}': {e}")))
}

fn parse_usage_id(raw: &str, line_no: usize) -> Result<u16, ReplayError> {
    match raw.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).map_err(|e| {
            ReplayError::Parse(format!("line {line_no}: invalid usage id '{raw}': {e}"))
        }),
        None => parse_field(raw, line_no, "usage id"),
    }
}

fn parse_flag(raw: &str, line_no: usize, yes: &str, no: &str) -> Result<bool, ReplayError> {
    if raw == yes {
        Ok(true)
    } else if raw == no {
        Ok(false)
    } else {
        Err(ReplayError::Parse(format!(
            "line {line_no}: expected `{yes}` or `{no}`, got '{raw}'"
        )))
    }
}

#[derive(Default)]
struct RecordingQueue {
    actions: Mutex<Vec<BindingAction>>,
}

impl BindingQueue for RecordingQueue {
    fn enqueue(&self, action: BindingAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

impl RecordingQueue {
    fn into_actions(self) -> Vec<BindingAction> {
        self.actions.into_inner().unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkippedTick {
    pub ms: u64,
    pub reason: IneligibleTick,
}

#[derive(Debug, Default)]
pub struct ReplayOutput {
    pub actions: Vec<BindingAction>,
    pub skipped: Vec<SkippedTick>,
}

impl ReplayOutput {
    /// `press 0x52` style tokens, the format expectation files use.
    pub fn labels(&self) -> Vec<String> {
        self.actions.iter().map(action_label).collect()
    }
}

pub fn action_label(action: &BindingAction) -> String {
    let kind = if action.pressed { "press" } else { "release" };
    match action.binding.key_usage() {
        Some(usage) => format!("{kind} {:#04x}", usage.id),
        None => format!("{kind} behavior{}", action.binding.behavior.0),
    }
}

/// Runs a trace against one translator with simulated time. Deadlines fire at
/// their exact instant, before any later trace event, and are flushed at the end.
pub fn replay(name: &str, config: HoldStepConfig, trace: &[TraceEvent]) -> ReplayOutput {
    let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let layers = ActiveLayers::new();
    let queue = RecordingQueue::default();
    let scheduler: TimeoutScheduler<CriticalSectionRawMutex> = TimeoutScheduler::new();
    let mut skipped = Vec::new();

    {
        let translator: ReplayTranslator<'_> =
            HoldStepTranslator::new(name, config, &layers, &queue, &scheduler);
        let mut registry: TranslatorRegistry<'_, 1> = TranslatorRegistry::new();
        registry
            .register(&translator)
            .expect("fresh registry has room");
        let listener = QuickReleaseListener::new(&registry);

        for event in trace {
            let now = Instant::from_millis(event.ms());
            while let Some(deadline) = registry.next_deadline() {
                if deadline > now {
                    break;
                }
                scheduler.poll(&registry, deadline);
            }

            match *event {
                TraceEvent::Tick {
                    ms,
                    encoder,
                    layer,
                    sample,
                } => {
                    let mode = ProcessMode::Trigger;
                    let result = translator
                        .accept(encoder, layer, sample)
                        .and_then(|_| translator.trigger(encoder, layer, mode, now));
                    if let Err(reason) = result {
                        skipped.push(SkippedTick { ms, reason });
                    }
                }
                TraceEvent::Key { usage, pressed, .. } => {
                    listener.on_key_state_changed(&KeyStateChanged {
                        usage,
                        pressed,
                        timestamp: now,
                    });
                }
                TraceEvent::Layer { layer, active, .. } => {
                    if active {
                        layers.activate(layer);
                    } else {
                        layers.deactivate(layer);
                    }
                }
            }
        }

        while let Some(deadline) = registry.next_deadline() {
            scheduler.poll(&registry, deadline);
        }
    }

    ReplayOutput {
        actions: queue.into_actions(),
        skipped,
    }
}

/// Reads an expectation file: one `press 0x52` / `release 0x52` token per line.
pub fn parse_expected(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
