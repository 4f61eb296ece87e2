use chrono::{DateTime, TimeDelta, Utc};

const MINUTE_MS: i64 = 60_000;
const SECOND_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub half_length_ms: i64,
    /// Nominal half-time pause. Display time never includes the real pause.
    pub half_time_budget_ms: i64,
    pub regulation_minutes: u16,
    /// Stoppage allowed past regulation before the clock completes by itself.
    pub stoppage_buffer_ms: i64,
    pub max_minute: u16,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            half_length_ms: 45 * MINUTE_MS,
            half_time_budget_ms: 15 * MINUTE_MS,
            regulation_minutes: 90,
            stoppage_buffer_ms: 10 * MINUTE_MS,
            max_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    NotStarted,
    FirstHalf,
    HalfTime,
    SecondHalf,
    StoppageTime,
    Completed,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::NotStarted => "Not started",
            Period::FirstHalf => "1st half",
            Period::HalfTime => "Half-time",
            Period::SecondHalf => "2nd half",
            Period::StoppageTime => "Stoppage time",
            Period::Completed => "Full-time",
        }
    }
}

/// What the clock shows at a given instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockReading {
    /// Pinned at regulation time once stoppage starts.
    pub minute: u16,
    pub second: u8,
    /// The N in `90+N`.
    pub stoppage: u16,
    pub period: Period,
}

impl ClockReading {
    /// Minute stamped on events recorded at this reading.
    pub fn event_minute(&self) -> u16 {
        self.minute + self.stoppage
    }

    pub fn is_extra_time(&self, config: &ClockConfig) -> bool {
        self.event_minute() > config.regulation_minutes
    }

    pub fn display(&self) -> String {
        if self.stoppage > 0 {
            format!("{}+{}", self.minute, self.stoppage)
        } else {
            format!("{:02}:{:02}", self.minute, self.second)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfTimeToggle {
    Paused,
    Resumed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    NotStarted,
    /// Display time is `base_ms + (now - anchor)`.
    Running {
        anchor: DateTime<Utc>,
        base_ms: i64,
        second_half: bool,
    },
    /// Frozen at `at_ms`. Automatic half-time ends after the nominal budget,
    /// a manual one only on an explicit resume.
    HalfTime {
        since: DateTime<Utc>,
        at_ms: i64,
        manual: bool,
    },
    Completed {
        at_ms: i64,
    },
}

/// Client-side match clock. Never persisted; every query takes the current
/// instant so the clock itself holds no timer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchClock {
    config: ClockConfig,
    kickoff: Option<DateTime<Utc>>,
    phase: Phase,
    /// Real time spent paused, for the record only.
    paused_ms: i64,
}

impl MatchClock {
    pub fn new(config: ClockConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        self.kickoff
    }

    pub fn paused_total(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.paused_ms)
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, Phase::Completed { .. })
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Record the kickoff instant. A kickoff in the past is fine: the phase
    /// is derived from the elapsed time on the next reading.
    pub fn start(&mut self, kickoff: DateTime<Utc>) -> bool {
        if self.phase != Phase::NotStarted {
            return false;
        }
        self.kickoff = Some(kickoff);
        self.phase = Phase::Running { anchor: kickoff, base_ms: 0, second_half: false };
        true
    }

    /// Reading at `now` without mutating the clock.
    pub fn reading(&self, now: DateTime<Utc>) -> ClockReading {
        let mut clock = *self;
        clock.advance(now);
        clock.read(now)
    }

    /// Apply due automatic transitions and return the reading.
    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockReading {
        self.advance(now);
        self.read(now)
    }

    /// Pause when running, resume when in half-time.
    pub fn toggle_half_time(&mut self, now: DateTime<Utc>) -> Option<HalfTimeToggle> {
        self.advance(now);
        match self.phase {
            Phase::Running { .. } => {
                let at_ms = self.shown_ms(now);
                self.phase = Phase::HalfTime { since: now, at_ms, manual: true };
                Some(HalfTimeToggle::Paused)
            }
            Phase::HalfTime { since, at_ms, .. } => {
                self.paused_ms += elapsed_ms(since, now);
                self.phase = Phase::Running {
                    anchor: now,
                    base_ms: at_ms.max(self.config.half_length_ms),
                    second_half: true,
                };
                Some(HalfTimeToggle::Resumed)
            }
            Phase::NotStarted | Phase::Completed { .. } => None,
        }
    }

    pub fn adjust_minutes(&mut self, now: DateTime<Utc>, delta: i32) -> bool {
        self.adjust(now, i64::from(delta) * MINUTE_MS)
    }

    /// Seconds roll over into the minute in either direction.
    pub fn adjust_seconds(&mut self, now: DateTime<Utc>, delta: i32) -> bool {
        self.adjust(now, i64::from(delta) * SECOND_MS)
    }

    /// Stop the clock where it stands.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.advance(now);
        let at_ms = match self.phase {
            Phase::NotStarted => 0,
            _ => self.shown_ms(now),
        };
        self.phase = Phase::Completed { at_ms };
    }

    /// Load an already finished match at its last known minute.
    pub fn complete_at_minute(&mut self, minute: u16) {
        self.phase = Phase::Completed { at_ms: i64::from(minute) * MINUTE_MS };
    }

    fn adjust(&mut self, now: DateTime<Utc>, delta_ms: i64) -> bool {
        self.advance(now);
        let max_ms = i64::from(self.config.max_minute) * MINUTE_MS + 59 * SECOND_MS;
        let shown = self.shown_ms(now);
        let diff = (shown + delta_ms).clamp(0, max_ms) - shown;
        match &mut self.phase {
            Phase::Running { base_ms, .. } => *base_ms += diff,
            Phase::HalfTime { at_ms, .. } => *at_ms += diff,
            Phase::NotStarted | Phase::Completed { .. } => return false,
        }
        true
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        loop {
            match self.phase {
                Phase::Running { anchor, base_ms, second_half: false } => {
                    let half = self.config.half_length_ms;
                    if base_ms + elapsed_ms(anchor, now) <= half {
                        return;
                    }
                    let since = anchor + TimeDelta::milliseconds((half - base_ms).max(0));
                    self.phase = Phase::HalfTime { since, at_ms: half, manual: false };
                }
                Phase::Running { anchor, base_ms, second_half: true } => {
                    let limit = i64::from(self.config.regulation_minutes) * MINUTE_MS
                        + self.config.stoppage_buffer_ms;
                    if base_ms + elapsed_ms(anchor, now) >= limit {
                        self.phase = Phase::Completed { at_ms: limit.max(base_ms) };
                    }
                    return;
                }
                Phase::HalfTime { since, at_ms, manual: false } => {
                    let budget = self.config.half_time_budget_ms;
                    if elapsed_ms(since, now) < budget {
                        return;
                    }
                    self.paused_ms += budget;
                    self.phase = Phase::Running {
                        anchor: since + TimeDelta::milliseconds(budget),
                        base_ms: at_ms.max(self.config.half_length_ms),
                        second_half: true,
                    };
                }
                Phase::HalfTime { manual: true, .. }
                | Phase::NotStarted
                | Phase::Completed { .. } => {
                    return;
                }
            }
        }
    }

    fn shown_ms(&self, now: DateTime<Utc>) -> i64 {
        match self.phase {
            Phase::NotStarted => 0,
            Phase::Running { anchor, base_ms, .. } => base_ms + elapsed_ms(anchor, now),
            Phase::HalfTime { at_ms, .. } | Phase::Completed { at_ms } => at_ms,
        }
    }

    fn read(&self, now: DateTime<Utc>) -> ClockReading {
        let regulation = i64::from(self.config.regulation_minutes);
        let shown = self.shown_ms(now).max(0);
        let total_minutes = shown / MINUTE_MS;
        let (minute, stoppage) = if total_minutes > regulation {
            (regulation, total_minutes - regulation)
        } else {
            (total_minutes, 0)
        };
        let period = match self.phase {
            Phase::NotStarted => Period::NotStarted,
            Phase::Running { second_half: false, .. } => Period::FirstHalf,
            Phase::Running { second_half: true, .. } if stoppage > 0 => Period::StoppageTime,
            Phase::Running { second_half: true, .. } => Period::SecondHalf,
            Phase::HalfTime { .. } => Period::HalfTime,
            Phase::Completed { .. } => Period::Completed,
        };
        ClockReading {
            minute: minute as u16,
            second: ((shown % MINUTE_MS) / SECOND_MS) as u8,
            stoppage: stoppage as u16,
            period,
        }
    }
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().max(0)
}
