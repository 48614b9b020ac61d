pub mod args_validator;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use clap::ValueEnum;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use crate::color::{self, ColorError};
use crate::util::transport::{TcpTransport, Transport};

/// Every command name the controller knows how to issue. Used as the assumed
/// capability set when a bulb is addressed explicitly and no advertisement is
/// available to learn its real one from.
pub const KNOWN_METHODS: &[&str] = &[
    "get_prop",
    "toggle",
    "set_power",
    "set_bright",
    "set_ct_abx",
    "set_hsv",
    "set_rgb",
    "set_name",
    "set_default",
    "set_adjust",
    "adjust_bright",
    "adjust_ct",
    "adjust_color",
    "start_cf",
    "stop_cf",
    "cron_add",
    "cron_get",
    "cron_del",
    "set_music",
];

#[derive(Debug, Error)]
pub enum BulbError {
    /// Malformed or incomplete discovery data.
    #[error("wrong advertisement data format: {0}")]
    WrongDataFormat(String),

    /// A command parameter outside its legal domain.
    #[error("incorrect argument: {0}")]
    InvalidArgument(String),

    /// The command is not in the bulb's advertised capability set.
    #[error("the bulb does not support '{0}'")]
    UnsupportedAction(String),

    /// A reply that carries no `result` field.
    #[error("unexpected reply: {0}")]
    Response(String),

    /// Connection or IO failure; propagated as-is, never retried.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A reply that is not valid JSON.
    #[error("undecodable reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Color(#[from] ColorError),

    /// Strict discovery found nothing within the collection window.
    #[error("no bulbs have been found")]
    NoBulbsFound,
}

/// A cached property value. The wire reports everything as strings; values
/// that parse as integers are stored as integers, everything else stays
/// textual, and readers coerce explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Int(i64),
    Str(String),
}

impl PropValue {
    fn coerce(raw: String) -> Self {
        match raw.parse::<i64>() {
            Ok(int) => PropValue::Int(int),
            Err(_) => PropValue::Str(raw),
        }
    }

    /// Maps a `get_prop` result slot into a cacheable value; empty strings
    /// and non-scalar slots yield `None` and must not overwrite the cache.
    fn from_reply(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(text) if !text.is_empty() => Some(Self::coerce(text.clone())),
            Value::Number(number) => number.as_i64().map(PropValue::Int),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(int) => Some(*int),
            PropValue::Str(text) => text.parse().ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PropValue::Int(_) => false,
            PropValue::Str(text) => text.is_empty(),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Int(int) => write!(f, "{}", int),
            PropValue::Str(text) => write!(f, "{}", text),
        }
    }
}

impl From<i64> for PropValue {
    fn from(int: i64) -> Self {
        PropValue::Int(int)
    }
}

impl From<&str> for PropValue {
    fn from(text: &str) -> Self {
        PropValue::Str(text.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdjustAction {
    Increase,
    Decrease,
    Circle,
}

impl AdjustAction {
    fn as_str(&self) -> &'static str {
        match self {
            AdjustAction::Increase => "increase",
            AdjustAction::Decrease => "decrease",
            AdjustAction::Circle => "circle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdjustProp {
    Bright,
    Ct,
    Color,
}

impl AdjustProp {
    fn as_str(&self) -> &'static str {
        match self {
            AdjustProp::Bright => "bright",
            AdjustProp::Ct => "ct",
            AdjustProp::Color => "color",
        }
    }
}

/// What the bulb recovers to once a color flow completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlowAction {
    /// Return to the state from before the flow.
    Recover,
    /// Stay at the flow's final state.
    Stay,
    /// Turn off.
    TurnOff,
}

impl FlowAction {
    fn code(&self) -> i64 {
        match self {
            FlowAction::Recover => 0,
            FlowAction::Stay => 1,
            FlowAction::TurnOff => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MusicAction {
    On,
    Off,
}

/// Snapshot of the interesting derived views, for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct BulbStatus {
    pub id: u64,
    pub name: String,
    pub power: String,
    pub brightness: i64,
    pub color_mode: i64,
    pub color_rgb: String,
    pub icon: String,
}

/// Construction knobs; the defaults match discovery's behavior.
pub struct BulbOptions {
    /// Shadow device properties locally to avoid a round trip per read.
    pub state_caching: bool,
    /// Replaces the per-call TCP transport, mainly for tests.
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for BulbOptions {
    fn default() -> Self {
        BulbOptions {
            state_caching: true,
            transport: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Shutdown,
    Flow,
}

/// At most one live background timer per kind. Starting a timer of a kind
/// aborts and replaces the previous one; dropping the slots aborts both.
#[derive(Default)]
struct TimerSlots {
    shutdown: Mutex<Option<JoinHandle<()>>>,
    flow: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlots {
    fn slot(&self, kind: TimerKind) -> &Mutex<Option<JoinHandle<()>>> {
        match kind {
            TimerKind::Shutdown => &self.shutdown,
            TimerKind::Flow => &self.flow,
        }
    }

    fn replace(&self, kind: TimerKind, handle: JoinHandle<()>) {
        let mut slot = lock(self.slot(kind));
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(handle);
    }

    fn cancel(&self, kind: TimerKind) -> bool {
        match lock(self.slot(kind)).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        self.cancel(TimerKind::Shutdown);
        self.cancel(TimerKind::Flow);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identity, transport and cached state, shared with the bulb's own timer
/// tasks and with nothing else.
struct BulbCore {
    id: u64,
    host: String,
    port: u16,
    support: HashSet<String>,
    state_caching: bool,
    state: Mutex<HashMap<String, PropValue>>,
    transport: Arc<dyn Transport>,
}

impl BulbCore {
    fn supports(&self, method: &str) -> bool {
        method == "set_name" || self.support.contains(method)
    }

    fn state_guard(&self) -> MutexGuard<'_, HashMap<String, PropValue>> {
        lock(&self.state)
    }

    /// Validated command dispatch: capability gate, request envelope, reply
    /// check. The gate fires before anything is written to the network.
    async fn perform(&self, method: &str, params: Vec<Value>) -> Result<Vec<Value>, BulbError> {
        if !self.supports(method) {
            return Err(BulbError::UnsupportedAction(method.to_string()));
        }

        let request = json!({ "id": 1, "method": method, "params": params }).to_string();
        debug!("Socket request: {}", request);
        let reply = self.transport.request(&request).await?;

        match reply.get("result").and_then(Value::as_array) {
            Some(result) => Ok(result.clone()),
            None => Err(BulbError::Response(reply.to_string())),
        }
    }

    fn set_prop(&self, key: &str, value: PropValue) {
        if self.state_caching {
            self.state_guard().insert(key.to_string(), value);
        }
    }

    fn cached_prop(&self, key: &str) -> Option<PropValue> {
        if !self.state_caching {
            return None;
        }
        self.state_guard()
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    async fn get_prop(&self, key: &str) -> Result<PropValue, BulbError> {
        if let Some(cached) = self.cached_prop(key) {
            return Ok(cached);
        }

        let fetched = self.load_props(&[key]).await?;
        let value = fetched
            .get(key)
            .cloned()
            .unwrap_or_else(|| PropValue::Str(String::new()));
        if self.state_caching {
            let mut state = self.state_guard();
            for (fetched_key, fetched_value) in fetched {
                state.insert(fetched_key, fetched_value);
            }
        }
        Ok(value)
    }

    /// One `get_prop` round trip for all the given keys; empty result slots
    /// are dropped rather than cached.
    async fn load_props(&self, keys: &[&str]) -> Result<HashMap<String, PropValue>, BulbError> {
        let params = keys.iter().map(|key| Value::from(*key)).collect();
        let result = self.perform("get_prop", params).await?;

        let mut props = HashMap::new();
        for (key, raw) in keys.iter().zip(result.iter()) {
            if let Some(value) = PropValue::from_reply(raw) {
                props.insert((*key).to_string(), value);
            }
        }
        Ok(props)
    }

    /// Re-queries every currently-cached key at once and overwrites the
    /// cache with whatever came back non-empty.
    async fn reload_state(&self) -> Result<(), BulbError> {
        if !self.state_caching {
            return Ok(());
        }
        info!("Reloading state");

        let keys: Vec<String> = self.state_guard().keys().cloned().collect();
        if keys.is_empty() {
            return Ok(());
        }
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let props = self.load_props(&key_refs).await?;

        let mut state = self.state_guard();
        for (key, value) in props {
            state.insert(key, value);
        }
        Ok(())
    }
}

/**
A single controllable bulb: immutable identity, advertised capability set,
an optional local shadow of its properties and up to two background timers
(delayed shutdown, flow completion).

Commands validate their arguments, go out as one JSON line over the
[`Transport`](crate::util::transport::Transport) and update the cache on
success. Equality and hashing go by numeric id; ordering goes by name.
*/
pub struct Bulb {
    core: Arc<BulbCore>,
    name: String,
    model: Option<String>,
    timers: TimerSlots,
}

impl Bulb {
    /**
    Builds a bulb from advertisement data: `id` (hexadecimal token),
    `Location` (`yeelight://host:port`), `support` (space-separated method
    names), optional `name` and `model`, plus any reported property values,
    which seed the cache when caching is on.
    */
    pub fn new(
        mut data: HashMap<String, String>,
        options: BulbOptions,
    ) -> Result<Self, BulbError> {
        debug!("Initializing a bulb from data={:?}", data);
        args_validator::check_initial_data(&data)?;

        let raw_id = data.remove("id").unwrap_or_default();
        let id = u64::from_str_radix(raw_id.trim().trim_start_matches("0x"), 16)
            .map_err(|_| BulbError::WrongDataFormat(format!("id '{}' is not hexadecimal", raw_id)))?;

        let raw_location = data.remove("Location").unwrap_or_default();
        let location = Url::parse(&raw_location).map_err(|_| {
            BulbError::WrongDataFormat(format!("location '{}' is not a url", raw_location))
        })?;
        let host = location
            .host_str()
            .ok_or_else(|| {
                BulbError::WrongDataFormat(format!("location '{}' has no host", raw_location))
            })?
            .to_string();
        let port = location.port_or_known_default().ok_or_else(|| {
            BulbError::WrongDataFormat(format!("location '{}' has no port", raw_location))
        })?;

        let support: HashSet<String> = data
            .remove("support")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let name = data.remove("name").unwrap_or_default();
        let model = data.remove("model");

        let state = if options.state_caching {
            // Whatever else the advertisement reported (power, bright,
            // color_mode, ct, rgb, hue, sat, vendor extras) seeds the cache.
            data.into_iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key, PropValue::coerce(value)))
                .collect()
        } else {
            HashMap::new()
        };

        let transport = options
            .transport
            .unwrap_or_else(|| Arc::new(TcpTransport::new(host.clone(), port)));

        Ok(Bulb {
            core: Arc::new(BulbCore {
                id,
                host,
                port,
                support,
                state_caching: options.state_caching,
                state: Mutex::new(state),
                transport,
            }),
            name,
            model,
            timers: TimerSlots::default(),
        })
    }

    /**
    Parses one discovery reply packet: an HTTP-like header block whose first
    line is a status line (discarded) and whose remaining lines are
    `key: value` pairs. Lines that do not split into exactly two parts are
    dropped.
    */
    pub fn from_advertisement(packet: &str, options: BulbOptions) -> Result<Self, BulbError> {
        let mut lines = packet.lines();
        let _status_line = lines.next();

        let data: HashMap<String, String> = lines
            .filter_map(|line| {
                line.trim()
                    .split_once(": ")
                    .map(|(key, value)| (key.to_string(), value.to_string()))
            })
            .collect();

        Self::new(data, options)
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.core.host
    }

    pub fn port(&self) -> u16 {
        self.core.port
    }

    pub fn state_caching(&self) -> bool {
        self.core.state_caching
    }

    /// `set_name` is implicitly supported; everything else must be in the
    /// advertised capability set.
    pub fn supports(&self, method: &str) -> bool {
        self.core.supports(method)
    }

    /// The `level`-th slash-delimited segment of the hierarchical name, if
    /// the name still has segments beyond it. The final segment is the
    /// bulb's own label, never a group.
    pub fn group_name(&self, level: usize) -> Option<&str> {
        if level == 0 {
            return None;
        }
        let chunks: Vec<&str> = self.name.split('/').collect();
        if chunks.len() > level {
            Some(chunks[level - 1])
        } else {
            None
        }
    }

    pub fn room(&self) -> Option<&str> {
        self.group_name(1)
    }

    // ---- property reads -------------------------------------------------

    /// Cached value when caching is on and the key is present and
    /// non-empty; a `get_prop` round trip (which refreshes the cache)
    /// otherwise.
    pub async fn get_prop(&self, key: &str) -> Result<PropValue, BulbError> {
        self.core.get_prop(key).await
    }

    /// Fetches all given keys in a single round trip, without consulting
    /// the cache.
    pub async fn load_props(&self, keys: &[&str]) -> Result<HashMap<String, PropValue>, BulbError> {
        self.core.load_props(keys).await
    }

    /// Re-queries every currently-cached key and overwrites the cache.
    pub async fn reload_state(&self) -> Result<(), BulbError> {
        self.core.reload_state().await
    }

    pub async fn power(&self) -> Result<String, BulbError> {
        Ok(self.get_prop("power").await?.to_string())
    }

    pub async fn on(&self) -> Result<bool, BulbError> {
        Ok(self.power().await? == "on")
    }

    pub async fn off(&self) -> Result<bool, BulbError> {
        Ok(!self.on().await?)
    }

    pub async fn brightness(&self) -> Result<i64, BulbError> {
        self.int_prop("bright").await
    }

    pub async fn color_mode(&self) -> Result<i64, BulbError> {
        self.int_prop("color_mode").await
    }

    pub async fn color_temperature(&self) -> Result<i64, BulbError> {
        self.int_prop("ct").await
    }

    pub async fn rgb(&self) -> Result<i64, BulbError> {
        self.int_prop("rgb").await
    }

    pub async fn hue(&self) -> Result<i64, BulbError> {
        self.int_prop("hue").await
    }

    pub async fn sat(&self) -> Result<i64, BulbError> {
        self.int_prop("sat").await
    }

    async fn int_prop(&self, key: &str) -> Result<i64, BulbError> {
        Ok(self.get_prop(key).await?.as_int().unwrap_or(0))
    }

    // ---- derived views --------------------------------------------------

    /// The color the bulb is currently showing, derived from its color
    /// mode: hue/sat and color temperature go through the converters in
    /// [`color`], rgb mode reads the raw cached value. A powered-off bulb
    /// renders as neutral gray.
    pub async fn current_color_rgb(&self) -> Result<u32, BulbError> {
        if self.off().await? {
            return Ok(color::OFF_COLOR);
        }

        match self.color_mode().await? {
            3 => Ok(color::huesat_to_rgb(self.hue().await?, self.sat().await?)?),
            2 => Ok(color::color_temperature_to_rgb(self.color_temperature().await?)?),
            _ => Ok(self.rgb().await?.clamp(0, 0xffffff) as u32),
        }
    }

    /// Coarse four-level brightness glyph; 'x' when the bulb is off.
    pub async fn brightness_character(&self) -> Result<char, BulbError> {
        if self.off().await? {
            return Ok('x');
        }
        Ok(match self.brightness().await? {
            bright if bright >= 100 => '●',
            40..=99 => '◕',
            10..=39 => '◑',
            _ => '○',
        })
    }

    pub async fn to_icon(&self) -> Result<String, BulbError> {
        Ok(self.brightness_character().await?.to_string())
    }

    pub async fn status(&self) -> Result<BulbStatus, BulbError> {
        Ok(BulbStatus {
            id: self.id(),
            name: self.name.clone(),
            power: self.power().await?,
            brightness: self.brightness().await?,
            color_mode: self.color_mode().await?,
            color_rgb: format!("{:06x}", self.current_color_rgb().await?),
            icon: self.to_icon().await?,
        })
    }

    // ---- commands -------------------------------------------------------

    /// Flips the power state. A cached power value flips locally without a
    /// read; otherwise the new state is read back from the device, since a
    /// post-toggle fetch already reflects the flip.
    pub async fn toggle(&self) -> Result<PowerState, BulbError> {
        let known_power = self.core.cached_prop("power");
        self.core.perform("toggle", vec![]).await?;

        let state = match known_power {
            Some(previous) => {
                if previous.to_string() == "on" {
                    PowerState::Off
                } else {
                    PowerState::On
                }
            }
            None => {
                if self.power().await? == "on" {
                    PowerState::On
                } else {
                    PowerState::Off
                }
            }
        };
        self.core
            .set_prop("power", PropValue::from(state.to_string().as_str()));
        Ok(state)
    }

    pub async fn set_power(&self, state: PowerState, duration: i64) -> Result<(), BulbError> {
        args_validator::check_duration(duration)?;

        self.core
            .perform(
                "set_power",
                vec![
                    Value::from(state.to_string()),
                    Value::from(effect_for(duration)),
                    Value::from(duration),
                ],
            )
            .await?;
        self.core
            .set_prop("power", PropValue::from(state.to_string().as_str()));
        Ok(())
    }

    pub async fn set_brightness(&self, brightness: i64, duration: i64) -> Result<(), BulbError> {
        args_validator::check_brightness(brightness)?;
        args_validator::check_duration(duration)?;

        self.core
            .perform(
                "set_bright",
                vec![
                    Value::from(brightness),
                    Value::from(effect_for(duration)),
                    Value::from(duration),
                ],
            )
            .await?;
        self.core.set_prop("bright", PropValue::Int(brightness));
        Ok(())
    }

    pub async fn set_color_temperature(
        &self,
        color_temperature: i64,
        duration: i64,
    ) -> Result<(), BulbError> {
        args_validator::check_color_temperature(color_temperature)?;
        args_validator::check_duration(duration)?;

        self.core
            .perform(
                "set_ct_abx",
                vec![
                    Value::from(color_temperature),
                    Value::from(effect_for(duration)),
                    Value::from(duration),
                ],
            )
            .await?;
        self.core.set_prop("color_mode", PropValue::Int(2));
        self.core.set_prop("ct", PropValue::Int(color_temperature));
        Ok(())
    }

    pub async fn set_huesat(&self, hue: i64, sat: i64, duration: i64) -> Result<(), BulbError> {
        args_validator::check_hue(hue)?;
        args_validator::check_sat(sat)?;
        args_validator::check_duration(duration)?;

        self.core
            .perform(
                "set_hsv",
                vec![
                    Value::from(hue),
                    Value::from(sat),
                    Value::from(effect_for(duration)),
                    Value::from(duration),
                ],
            )
            .await?;
        self.core.set_prop("color_mode", PropValue::Int(3));
        self.core.set_prop("hue", PropValue::Int(hue));
        self.core.set_prop("sat", PropValue::Int(sat));
        Ok(())
    }

    pub async fn set_rgb(&self, rgb: u32, duration: i64) -> Result<(), BulbError> {
        args_validator::check_rgb(i64::from(rgb))?;
        args_validator::check_duration(duration)?;

        self.core
            .perform(
                "set_rgb",
                vec![
                    Value::from(rgb),
                    Value::from(effect_for(duration)),
                    Value::from(duration),
                ],
            )
            .await?;
        self.core.set_prop("color_mode", PropValue::Int(1));
        self.core.set_prop("rgb", PropValue::Int(i64::from(rgb)));
        Ok(())
    }

    pub async fn random_color(&self, duration: i64) -> Result<u32, BulbError> {
        let rgb = rand::thread_rng().gen_range(0x000001..=0xffffff);
        self.set_rgb(rgb, duration).await?;
        Ok(rgb)
    }

    /// Renames the bulb on the device and locally. Always supported, even
    /// when absent from the advertised capability set.
    pub async fn set_name(&mut self, name: &str) -> Result<(), BulbError> {
        self.core
            .perform("set_name", vec![Value::from(name)])
            .await?;
        self.name = name.to_string();
        Ok(())
    }

    /// Makes the current state the bulb's factory-reset default.
    pub async fn set_default(&self) -> Result<(), BulbError> {
        self.core.perform("set_default", vec![]).await?;
        Ok(())
    }

    /// Nudges one property in firmware-defined steps; the resulting values
    /// are only knowable by re-reading, so the whole cache reloads.
    pub async fn adjust(&self, action: AdjustAction, prop: AdjustProp) -> Result<(), BulbError> {
        self.core
            .perform(
                "set_adjust",
                vec![Value::from(action.as_str()), Value::from(prop.as_str())],
            )
            .await?;
        if self.core.state_caching {
            self.core.reload_state().await?;
        }
        Ok(())
    }

    pub async fn adjust_brightness(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        self.adjust_by_percentage("adjust_bright", percentage, duration)
            .await
    }

    pub async fn adjust_ct(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        self.adjust_by_percentage("adjust_ct", percentage, duration)
            .await
    }

    pub async fn adjust_color(&self, percentage: i64, duration: i64) -> Result<(), BulbError> {
        self.adjust_by_percentage("adjust_color", percentage, duration)
            .await
    }

    async fn adjust_by_percentage(
        &self,
        method: &str,
        percentage: i64,
        duration: i64,
    ) -> Result<(), BulbError> {
        args_validator::check_percentage(percentage)?;
        args_validator::check_duration(duration)?;

        self.core
            .perform(method, vec![Value::from(percentage), Value::from(duration)])
            .await?;
        if self.core.state_caching {
            self.core.reload_state().await?;
        }
        Ok(())
    }

    /**
    Starts a color flow of `count` repetitions over the given expression
    (validated `duration, mode, value, brightness` quadruples). Any pending
    flow-completion timer is cancelled first; for a finite flow a new one is
    scheduled for the flow's total duration, to reload the cache once the
    firmware finishes. An infinite flow (`count == 0`) schedules nothing:
    the cache goes stale until an explicit [`Self::reload_state`].
    */
    pub async fn start_cf(
        &self,
        count: i64,
        action: FlowAction,
        expression: &[i64],
    ) -> Result<(), BulbError> {
        args_validator::check_cf_count(count)?;
        args_validator::check_cf_expression(expression)?;

        self.timers.cancel(TimerKind::Flow);

        let expression_param = expression
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.core
            .perform(
                "start_cf",
                vec![
                    Value::from(count),
                    Value::from(action.code()),
                    Value::from(expression_param),
                ],
            )
            .await?;

        if self.core.state_caching && count != 0 {
            self.start_flow_timer(flow_total_duration(count, expression));
        }
        Ok(())
    }

    /// Stops a running color flow, reloads the cache and drops the
    /// flow-completion timer.
    pub async fn stop_cf(&self) -> Result<(), BulbError> {
        self.core.perform("stop_cf", vec![]).await?;

        if self.core.state_caching {
            self.core.reload_state().await?;
            self.timers.cancel(TimerKind::Flow);
        }
        Ok(())
    }

    /**
    Schedules a device-side shutdown after the given number of minutes and,
    with caching on, a local timer that marks the cached power off when the
    deadline passes. Zero minutes cancels instead. A new call replaces any
    pending shutdown timer.
    */
    pub async fn delayed_shutdown_after(&self, minutes: i64) -> Result<(), BulbError> {
        args_validator::check_timeout(minutes)?;

        if minutes == 0 {
            return self.cancel_delayed_shutdown().await;
        }

        self.core
            .perform("cron_add", vec![Value::from(0), Value::from(minutes)])
            .await?;

        if self.core.state_caching {
            self.start_shutdown_timer(Duration::from_secs(minutes as u64 * 60));
        }
        Ok(())
    }

    /// Minutes left on the device-side shutdown schedule, if any.
    pub async fn delayed_shutdown(&self) -> Result<Option<i64>, BulbError> {
        let result = self.core.perform("cron_get", vec![Value::from(0)]).await?;
        Ok(result
            .first()
            .and_then(|entry| entry.get("delay"))
            .and_then(Value::as_i64))
    }

    /// Cancels the device-side shutdown schedule and kills any live local
    /// shutdown timer.
    pub async fn cancel_delayed_shutdown(&self) -> Result<(), BulbError> {
        self.core.perform("cron_del", vec![Value::from(0)]).await?;

        if self.timers.cancel(TimerKind::Shutdown) {
            info!("The pending shutdown timer has been killed");
        }
        Ok(())
    }

    /// Tells the bulb to open (or close) a music-mode stream to the given
    /// host and port. The bulb connects out; no local state changes.
    pub async fn set_music(
        &self,
        action: MusicAction,
        host: &str,
        port: u16,
    ) -> Result<(), BulbError> {
        args_validator::check_host(host)?;
        args_validator::check_port(port)?;

        let action_code = match action {
            MusicAction::On => 1,
            MusicAction::Off => 0,
        };
        self.core
            .perform(
                "set_music",
                vec![
                    Value::from(action_code),
                    Value::from(host),
                    Value::from(port),
                ],
            )
            .await?;
        Ok(())
    }

    // ---- timers ----------------------------------------------------------

    fn start_shutdown_timer(&self, timeout: Duration) {
        let core = Arc::clone(&self.core);
        // Anchor the deadline to when the command completed, not to the
        // spawned task's first poll.
        let deadline = tokio::time::Instant::now() + timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            core.set_prop("power", PropValue::from("off"));
            info!("The cached power state has been marked off");
        });
        self.timers.replace(TimerKind::Shutdown, handle);
        info!("Scheduled a local power-off mark in {:?}", timeout);
    }

    fn start_flow_timer(&self, timeout: Duration) {
        let core = Arc::clone(&self.core);
        let deadline = tokio::time::Instant::now() + timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The timer has no supervisor; a failed reload is logged and
            // the cache simply stays stale.
            if let Err(error) = core.reload_state().await {
                warn!("State reload after a color flow failed: {}", error);
            }
        });
        self.timers.replace(TimerKind::Flow, handle);
        info!(
            "Scheduled a state reload in {:?}, once the color flow completes",
            timeout
        );
    }
}

impl Drop for Bulb {
    fn drop(&mut self) {
        self.timers.cancel_all();
    }
}

impl fmt::Debug for Bulb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulb")
            .field("id", &self.core.id)
            .field("name", &self.name)
            .field("host", &self.core.host)
            .field("port", &self.core.port)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Bulb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Bulb id={} name={}>", self.core.id, self.name)
    }
}

impl PartialEq for Bulb {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for Bulb {}

impl Hash for Bulb {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

impl PartialOrd for Bulb {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bulb {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

fn effect_for(duration: i64) -> &'static str {
    if duration > 0 {
        "smooth"
    } else {
        "sudden"
    }
}

/// Total wall time of a finite flow: every repetition consumes one step, and
/// step `i` lasts as long as the duration slot of quadruple `i` (cyclically).
/// Computed in closed form over the duration slots, so a huge repetition
/// count costs nothing; totals beyond what a [`Duration`] holds saturate.
fn flow_total_duration(count: i64, expression: &[i64]) -> Duration {
    let slots: Vec<u128> = expression
        .iter()
        .step_by(4)
        .map(|ms| (*ms).max(0) as u128)
        .collect();
    if slots.is_empty() {
        return Duration::ZERO;
    }

    let steps = count.max(0) as u128;
    let cycles = steps / slots.len() as u128;
    let remainder = (steps % slots.len() as u128) as usize;

    let cycle_sum: u128 = slots.iter().sum();
    let remainder_sum: u128 = slots[..remainder].iter().sum();

    let total_ms = cycles * cycle_sum + remainder_sum;
    Duration::from_millis(total_ms.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::task::yield_now;
    use tokio::time::advance;

    use super::*;
    use crate::util::transport::testing::MockTransport;

    fn advertisement_data(id: &str, name: &str) -> HashMap<String, String> {
        let mut data = HashMap::new();
        data.insert("id".to_string(), id.to_string());
        data.insert(
            "Location".to_string(),
            "yeelight://127.0.0.1:55443".to_string(),
        );
        data.insert("support".to_string(), KNOWN_METHODS.join(" "));
        data.insert("name".to_string(), name.to_string());
        data
    }

    fn bulb_with(
        mut data: HashMap<String, String>,
        state: &[(&str, &str)],
        state_caching: bool,
        transport: Arc<MockTransport>,
    ) -> Bulb {
        for (key, value) in state {
            data.insert((*key).to_string(), (*value).to_string());
        }
        Bulb::new(
            data,
            BulbOptions {
                state_caching,
                transport: Some(transport),
            },
        )
        .unwrap()
    }

    fn cached_bulb(state: &[(&str, &str)], transport: Arc<MockTransport>) -> Bulb {
        bulb_with(
            advertisement_data("0x1", "kitchen/ceiling"),
            state,
            true,
            transport,
        )
    }

    async fn settle() {
        // Give spawned timer tasks a chance to observe the advanced clock.
        for _ in 0..4 {
            yield_now().await;
        }
    }

    #[test]
    fn test_new_rejects_incomplete_data() {
        let mut data = advertisement_data("0x1", "bulb");
        data.remove("support");
        let result = Bulb::new(data, BulbOptions::default());
        assert!(matches!(result, Err(BulbError::WrongDataFormat(_))));
    }

    #[test]
    fn test_new_parses_hexadecimal_id_and_location() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = bulb_with(
            advertisement_data("0x0000000000abc123", "hall/lamp"),
            &[],
            true,
            transport,
        );
        assert_eq!(bulb.id(), 0xabc123);
        assert_eq!(bulb.host(), "127.0.0.1");
        assert_eq!(bulb.port(), 55443);
        assert_eq!(bulb.name(), "hall/lamp");
    }

    #[test]
    fn test_from_advertisement_drops_malformed_lines() {
        let packet = "HTTP/1.1 200 OK\r\n\
                      Cache-Control: max-age=3600\r\n\
                      Location: yeelight://192.168.1.2:55443\r\n\
                      garbage-line-without-separator\r\n\
                      id: 0x12\r\n\
                      support: get_prop toggle\r\n\
                      name: kitchen/ceiling\r\n\
                      power: on\r\n";
        let bulb = Bulb::from_advertisement(packet, BulbOptions::default()).unwrap();
        assert_eq!(bulb.id(), 0x12);
        assert_eq!(bulb.host(), "192.168.1.2");
        assert!(bulb.supports("toggle"));
        assert!(!bulb.supports("set_music"));
    }

    #[test]
    fn test_equality_is_by_id_only() {
        let first = bulb_with(
            advertisement_data("0x1", "kitchen/ceiling"),
            &[("power", "on")],
            true,
            Arc::new(MockTransport::ok()),
        );
        let twin = bulb_with(
            advertisement_data("0x1", "another/name"),
            &[("power", "off")],
            true,
            Arc::new(MockTransport::ok()),
        );
        let other = bulb_with(
            advertisement_data("0x2", "kitchen/ceiling"),
            &[("power", "on")],
            true,
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(first, twin);
        assert_ne!(first, other);
    }

    #[test]
    fn test_ordering_is_by_name() {
        let a = bulb_with(
            advertisement_data("0x2", "attic"),
            &[],
            true,
            Arc::new(MockTransport::ok()),
        );
        let z = bulb_with(
            advertisement_data("0x1", "zen-room"),
            &[],
            true,
            Arc::new(MockTransport::ok()),
        );
        assert!(a < z);
    }

    #[test]
    fn test_group_name_segments() {
        let bulb = bulb_with(
            advertisement_data("0x1", "room/group/subgroup/name"),
            &[],
            true,
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(bulb.group_name(1), Some("room"));
        assert_eq!(bulb.group_name(2), Some("group"));
        assert_eq!(bulb.group_name(3), Some("subgroup"));
        assert_eq!(bulb.group_name(4), None);
        assert_eq!(bulb.group_name(0), None);
        assert_eq!(bulb.room(), Some("room"));
    }

    #[tokio::test]
    async fn test_unsupported_command_issues_no_network_call() {
        let transport = Arc::new(MockTransport::ok());
        let mut data = advertisement_data("0x1", "bulb");
        data.insert("support".to_string(), "get_prop".to_string());
        let bulb = bulb_with(data, &[("power", "on")], true, Arc::clone(&transport));

        let result = bulb.set_power(PowerState::Off, 0).await;
        assert!(matches!(result, Err(BulbError::UnsupportedAction(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_set_name_is_implicitly_supported() {
        let transport = Arc::new(MockTransport::ok());
        let mut data = advertisement_data("0x1", "bulb");
        data.insert("support".to_string(), "get_prop".to_string());
        let mut bulb = bulb_with(data, &[], true, Arc::clone(&transport));

        bulb.set_name("study/desk").await.unwrap();
        assert_eq!(bulb.name(), "study/desk");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_argument_issues_no_network_call() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        assert!(matches!(
            bulb.set_brightness(0, 0).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert!(matches!(
            bulb.set_color_temperature(1699, 0).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert!(matches!(
            bulb.set_huesat(360, 100, 0).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert!(matches!(
            bulb.set_rgb(0, 0).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert!(matches!(
            bulb.delayed_shutdown_after(1441).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert!(matches!(
            bulb.set_music(MusicAction::On, "not-a-host", 8080).await,
            Err(BulbError::InvalidArgument(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_result_is_a_response_error() {
        let transport = Arc::new(MockTransport::replying(vec![json!({
            "id": 1,
            "error": { "code": -1, "message": "general error" }
        })]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        let result = bulb.set_power(PowerState::Off, 0).await;
        assert!(matches!(result, Err(BulbError::Response(_))));
        // The failed command must not touch the cache.
        assert_eq!(bulb.power().await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_write_then_read_hits_the_cache() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on"), ("bright", "50")], Arc::clone(&transport));

        bulb.set_brightness(80, 0).await.unwrap();
        assert_eq!(transport.request_count(), 1);
        assert_eq!(bulb.brightness().await.unwrap(), 80);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_toggle_flips_cached_power() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        assert_eq!(bulb.toggle().await.unwrap(), PowerState::Off);
        assert_eq!(bulb.power().await.unwrap(), "off");
        assert_eq!(transport.request_count(), 1);

        assert_eq!(bulb.toggle().await.unwrap(), PowerState::On);
        assert_eq!(bulb.power().await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_toggle_rereads_when_caching_is_off() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["ok"] }),
            json!({ "id": 1, "result": ["off"] }),
        ]));
        let bulb = bulb_with(
            advertisement_data("0x1", "bulb"),
            &[("power", "on")],
            false,
            Arc::clone(&transport),
        );

        assert_eq!(bulb.toggle().await.unwrap(), PowerState::Off);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_toggle_reads_back_when_power_was_never_cached() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["ok"] }),
            json!({ "id": 1, "result": ["on"] }),
        ]));
        let bulb = cached_bulb(&[], Arc::clone(&transport));

        // The device answered "on" after the flip; flipping that blindly
        // would cache the opposite of reality.
        assert_eq!(bulb.toggle().await.unwrap(), PowerState::On);
        assert_eq!(transport.request_count(), 2);

        assert_eq!(bulb.power().await.unwrap(), "on");
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_get_prop_miss_fetches_and_refreshes_the_cache() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["180"] }),
        ]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        assert_eq!(bulb.get_prop("hue").await.unwrap(), PropValue::Int(180));
        assert_eq!(transport.request_count(), 1);
        // Second read comes from the refreshed cache.
        assert_eq!(bulb.hue().await.unwrap(), 180);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_every_read_goes_to_the_network_when_caching_is_off() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["on"] }),
            json!({ "id": 1, "result": ["on"] }),
        ]));
        let bulb = bulb_with(
            advertisement_data("0x1", "bulb"),
            &[("power", "on")],
            false,
            Arc::clone(&transport),
        );

        assert!(bulb.on().await.unwrap());
        assert!(bulb.on().await.unwrap());
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_reload_state_overwrites_cached_values() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["off"] }),
        ]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.reload_state().await.unwrap();
        assert_eq!(bulb.power().await.unwrap(), "off");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_state_skips_empty_values() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": [""] }),
        ]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.reload_state().await.unwrap();
        assert_eq!(bulb.power().await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_current_color_dispatches_on_color_mode() {
        let bulb = cached_bulb(
            &[("power", "on"), ("color_mode", "2"), ("ct", "4000")],
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(bulb.current_color_rgb().await.unwrap(), 16_764_582);

        let bulb = cached_bulb(
            &[
                ("power", "on"),
                ("color_mode", "3"),
                ("hue", "0"),
                ("sat", "100"),
            ],
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(bulb.current_color_rgb().await.unwrap(), 0xff0000);

        let bulb = cached_bulb(
            &[("power", "on"), ("color_mode", "1"), ("rgb", "65280")],
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(bulb.current_color_rgb().await.unwrap(), 0x00ff00);
    }

    #[tokio::test]
    async fn test_current_color_is_gray_when_off() {
        let bulb = cached_bulb(
            &[("power", "off"), ("color_mode", "1"), ("rgb", "65280")],
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(bulb.current_color_rgb().await.unwrap(), 0x888888);
    }

    #[tokio::test]
    async fn test_brightness_character_tiers() {
        for (bright, expected) in [("100", '●'), ("99", '◕'), ("40", '◕'), ("39", '◑'), ("10", '◑'), ("9", '○')] {
            let bulb = cached_bulb(
                &[("power", "on"), ("bright", bright)],
                Arc::new(MockTransport::ok()),
            );
            assert_eq!(
                bulb.brightness_character().await.unwrap(),
                expected,
                "bright={}",
                bright
            );
        }

        let off = cached_bulb(
            &[("power", "off"), ("bright", "100")],
            Arc::new(MockTransport::ok()),
        );
        assert_eq!(off.brightness_character().await.unwrap(), 'x');
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timer_marks_power_off() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.delayed_shutdown_after(1).await.unwrap();
        assert_eq!(transport.request_count(), 1);

        advance(Duration::from_secs(61)).await;
        settle().await;

        assert_eq!(bulb.power().await.unwrap(), "off");
        // The local mark happens without another round trip.
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_a_shutdown_timer_cancels_the_first() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.delayed_shutdown_after(1).await.unwrap();
        advance(Duration::from_secs(30)).await;
        settle().await;

        bulb.delayed_shutdown_after(10).await.unwrap();

        // Past the first timer's deadline: its action must never fire.
        advance(Duration::from_secs(40)).await;
        settle().await;
        assert_eq!(bulb.power().await.unwrap(), "on");

        advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(bulb.power().await.unwrap(), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_delayed_shutdown_kills_the_timer() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.delayed_shutdown_after(1).await.unwrap();
        bulb.cancel_delayed_shutdown().await.unwrap();

        advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(bulb.power().await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_zero_minutes_cancels_instead_of_scheduling() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.delayed_shutdown_after(0).await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("cron_del"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finite_flow_schedules_a_state_reload() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["ok"] }),
            json!({ "id": 1, "result": ["off"] }),
        ]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.start_cf(2, FlowAction::Stay, &[500, 1, 255, 100])
            .await
            .unwrap();
        assert_eq!(transport.request_count(), 1);

        // Two repetitions of a 500ms step.
        advance(Duration::from_millis(1100)).await;
        settle().await;

        assert_eq!(transport.request_count(), 2);
        assert_eq!(bulb.power().await.unwrap(), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_flow_schedules_nothing() {
        let transport = Arc::new(MockTransport::ok());
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.start_cf(0, FlowAction::Recover, &[500, 1, 255, 100])
            .await
            .unwrap();

        advance(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_cf_reloads_the_cache() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["ok"] }),
            json!({ "id": 1, "result": ["off"] }),
        ]));
        let bulb = cached_bulb(&[("power", "on")], Arc::clone(&transport));

        bulb.stop_cf().await.unwrap();
        assert_eq!(transport.request_count(), 2);
        assert_eq!(bulb.power().await.unwrap(), "off");
    }

    #[tokio::test]
    async fn test_adjust_reloads_the_cache() {
        let transport = Arc::new(MockTransport::replying(vec![
            json!({ "id": 1, "result": ["ok"] }),
            json!({ "id": 1, "result": ["35"] }),
        ]));
        let bulb = cached_bulb(&[("bright", "50")], Arc::clone(&transport));

        bulb.adjust(AdjustAction::Decrease, AdjustProp::Bright)
            .await
            .unwrap();
        assert_eq!(transport.request_count(), 2);
        assert_eq!(bulb.brightness().await.unwrap(), 35);
    }

    #[test]
    fn test_flow_total_duration_cycles_through_duration_slots() {
        assert_eq!(
            flow_total_duration(2, &[500, 1, 255, 100]),
            Duration::from_millis(1000)
        );
        assert_eq!(
            flow_total_duration(3, &[500, 1, 255, 100, 1000, 2, 2700, 50]),
            Duration::from_millis(2000)
        );
        assert_eq!(flow_total_duration(0, &[500, 1, 255, 100]), Duration::ZERO);
    }

    #[test]
    fn test_flow_total_duration_survives_extreme_validated_inputs() {
        // Step durations only have a floor, so the sum must not wrap.
        let expression = [i64::MAX, 7, 0, 0, i64::MAX, 7, 0, 0];
        args_validator::check_cf_expression(&expression).unwrap();
        assert_eq!(
            flow_total_duration(2, &expression),
            Duration::from_millis(u64::MAX - 1)
        );

        // A huge repetition count must neither wrap nor take forever.
        assert_eq!(
            flow_total_duration(i64::MAX, &[50, 7, 0, 0]),
            Duration::from_millis(u64::MAX)
        );
    }

    #[test]
    fn test_prop_value_coercion() {
        assert_eq!(PropValue::coerce("42".to_string()), PropValue::Int(42));
        assert_eq!(
            PropValue::coerce("on".to_string()),
            PropValue::Str("on".to_string())
        );
        assert_eq!(PropValue::from_reply(&json!("")), None);
        assert_eq!(PropValue::from_reply(&json!("7")), Some(PropValue::Int(7)));
        assert_eq!(PropValue::from_reply(&json!(7)), Some(PropValue::Int(7)));
        assert_eq!(PropValue::Str("100".to_string()).as_int(), Some(100));
        assert_eq!(PropValue::Str("on".to_string()).as_int(), None);
    }
}
