use rand::Rng;
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::ScalePreset;

// -------------------------------------------------------------------------------------------------

/// Max number of steps in a permutation based arpeggio.
pub const MAX_ARP_STEPS: usize = 8;

/// Note tables are limited to `[-MAX_NOTE_SPAN, MAX_NOTE_SPAN]` semitones around the original
/// pitch.
pub const MAX_NOTE_SPAN: i32 = 128;

// -------------------------------------------------------------------------------------------------

/// Enumerate all pitches of a scale within the inclusive semitone range `[low, high]`.
/// Returns absolute semitones in ascending order without duplicates.
///
/// Bounds and root are clamped to [`MAX_NOTE_SPAN`].
pub fn build_note_table(scale_intervals: &[i32], root_note: i32, low: i32, high: i32) -> Vec<i32> {
    let clamp = |value: i32| value.clamp(-MAX_NOTE_SPAN, MAX_NOTE_SPAN);
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let (low, high, root_note) = (clamp(low), clamp(high), clamp(root_note));
    let mut notes = Vec::new();
    let first_octave = (low - root_note).div_euclid(12) - 1;
    let last_octave = (high - root_note).div_euclid(12) + 1;
    for octave in first_octave..=last_octave {
        for degree in scale_intervals {
            let note = (octave * 12 + root_note).saturating_add(*degree);
            if note >= low && note <= high {
                notes.push(note);
            }
        }
    }
    notes.sort_unstable();
    notes.dedup();
    notes
}

/// Sample `step_count` evenly spaced entries from the given note table, always including the
/// first and last note when there are at least two steps.
pub fn select_arp_notes(table: &[i32], step_count: usize) -> Vec<i32> {
    if table.is_empty() || step_count == 0 {
        return Vec::new();
    }
    if step_count == 1 {
        return vec![table[0]];
    }
    let last = (table.len() - 1) as f64;
    (0..step_count)
        .map(|step| {
            let index = (step as f64 * last / (step_count - 1) as f64).round() as usize;
            table[index.min(table.len() - 1)]
        })
        .collect()
}

/// All permutations of `0..n` in lexicographic order.
pub fn get_permutations(n: usize) -> Vec<Vec<usize>> {
    fn permute(prefix: &mut Vec<usize>, remaining: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if remaining.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for index in 0..remaining.len() {
            let value = remaining.remove(index);
            prefix.push(value);
            permute(prefix, remaining, out);
            prefix.pop();
            remaining.insert(index, value);
        }
    }
    let mut permutations = Vec::new();
    permute(&mut Vec::with_capacity(n), &mut (0..n).collect(), &mut permutations);
    permutations
}

/// The `k`-th lexicographic permutation of `0..n`, without enumerating all of them.
/// `k` wraps around the number of permutations.
pub fn nth_permutation(n: usize, k: usize) -> Vec<usize> {
    let count = factorial(n);
    let mut k = k % count;
    let mut remaining = (0..n).collect::<Vec<_>>();
    let mut permutation = Vec::with_capacity(n);
    for position in (0..n).rev() {
        let block = factorial(position);
        let index = k / block;
        k %= block;
        permutation.push(remaining.remove(index));
    }
    permutation
}

fn factorial(n: usize) -> usize {
    (1..=n).product::<usize>().max(1)
}

// -------------------------------------------------------------------------------------------------

/// A user edited step sequence: indices into the full note table plus per-step mute flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArpPattern {
    steps: Vec<usize>,
    mutes: Vec<bool>,
}

impl ArpPattern {
    /// Create a new pattern. Missing mute flags are treated as unmuted.
    pub fn new(steps: Vec<usize>, mut mutes: Vec<bool>) -> Self {
        mutes.resize(steps.len(), false);
        Self { steps, mutes }
    }

    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn mutes(&self) -> &[bool] {
        &self.mutes
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// -------------------------------------------------------------------------------------------------

/// How the arpeggiator selects pitches.
#[derive(
    Default, Clone, Copy, PartialEq, Eq, Debug, Display, EnumIter, EnumString, VariantNames,
)]
pub enum ArpMode {
    /// Walk a cyclic step sequence.
    #[default]
    Sequence,
    /// Pick a random note from the note table for every grain.
    RandomNote,
}

/// Direction in which a step sequence is walked.
#[derive(
    Default, Clone, Copy, PartialEq, Eq, Debug, Display, EnumIter, EnumString, VariantNames,
)]
pub enum ArpPlayback {
    #[default]
    Forward,
    Backward,
    PingPong,
}

// -------------------------------------------------------------------------------------------------

/// Arpeggiator configuration, as set by a voice's parameter update.
#[derive(Debug, Clone, PartialEq)]
pub struct ArpConfig {
    pub mode: ArpMode,
    pub scale: Vec<i32>,
    pub root: i32,
    /// Lowest note of the note table in semitones.
    pub low: i32,
    /// Highest note of the note table in semitones.
    pub high: i32,
    /// Number of evenly spaced notes selected from the note table. At most [`MAX_ARP_STEPS`].
    pub steps: usize,
    /// Index of the permutation applied to the selected notes.
    pub style: usize,
    pub playback: ArpPlayback,
    /// Custom step sequence which overrides the permutation derived sequence.
    pub pattern: Option<ArpPattern>,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            mode: ArpMode::default(),
            scale: ScalePreset::Major.intervals().to_vec(),
            root: 0,
            low: -12,
            high: 12,
            steps: 4,
            style: 0,
            playback: ArpPlayback::default(),
            pattern: None,
        }
    }
}

impl ArpConfig {
    pub fn with_mode(mut self, mode: ArpMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_scale(mut self, preset: ScalePreset, root: i32) -> Self {
        self.scale = preset.intervals().to_vec();
        self.root = root;
        self
    }

    pub fn with_range(mut self, low: i32, high: i32) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps.min(MAX_ARP_STEPS);
        self
    }

    pub fn with_style(mut self, style: usize) -> Self {
        self.style = style;
        self
    }

    pub fn with_playback(mut self, playback: ArpPlayback) -> Self {
        self.playback = playback;
        self
    }

    pub fn with_pattern(mut self, pattern: ArpPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// A single resolved arpeggiator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpStep {
    pub semitones: i32,
    pub muted: bool,
}

/// Runtime state of an arpeggiator: the resolved note sequence and its playback cursor.
#[derive(Debug, Clone)]
pub struct ArpState {
    mode: ArpMode,
    playback: ArpPlayback,
    table: Vec<i32>,
    sequence: Vec<ArpStep>,
    cursor: usize,
    ascending: bool,
}

impl ArpState {
    pub fn new(config: &ArpConfig) -> Self {
        let table = build_note_table(&config.scale, config.root, config.low, config.high);
        let sequence = match &config.pattern {
            Some(pattern) if !table.is_empty() => pattern
                .steps()
                .iter()
                .zip(pattern.mutes())
                .map(|(index, muted)| ArpStep {
                    semitones: table[index % table.len()],
                    muted: *muted,
                })
                .collect(),
            _ => {
                let notes = select_arp_notes(&table, config.steps.min(MAX_ARP_STEPS));
                nth_permutation(notes.len(), config.style)
                    .into_iter()
                    .map(|index| ArpStep {
                        semitones: notes[index],
                        muted: false,
                    })
                    .collect()
            }
        };
        Self {
            mode: config.mode,
            playback: config.playback,
            table,
            sequence,
            cursor: 0,
            ascending: true,
        }
    }

    pub fn mode(&self) -> ArpMode {
        self.mode
    }

    /// All notes the arpeggiator may play, ascending.
    pub fn note_table(&self) -> &[i32] {
        &self.table
    }

    /// The resolved step sequence.
    pub fn sequence(&self) -> &[ArpStep] {
        &self.sequence
    }

    /// Rewind the cursor to the first step.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.ascending = true;
    }

    /// Return the current step and advance the cursor. None when the sequence is empty.
    pub fn next_step(&mut self) -> Option<ArpStep> {
        let len = self.sequence.len();
        if len == 0 {
            return None;
        }
        let index = match self.playback {
            ArpPlayback::Forward => {
                let index = self.cursor;
                self.cursor = (self.cursor + 1) % len;
                index
            }
            ArpPlayback::Backward => {
                let index = len - 1 - self.cursor;
                self.cursor = (self.cursor + 1) % len;
                index
            }
            ArpPlayback::PingPong => {
                let index = self.cursor;
                if len > 1 {
                    if self.ascending {
                        if self.cursor + 1 >= len {
                            self.ascending = false;
                            self.cursor -= 1;
                        } else {
                            self.cursor += 1;
                        }
                    } else if self.cursor == 0 {
                        self.ascending = true;
                        self.cursor = 1;
                    } else {
                        self.cursor -= 1;
                    }
                }
                index
            }
        };
        Some(self.sequence[index])
    }

    /// Pick a random note from the note table. None when the table is empty.
    pub fn random_note<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i32> {
        if self.table.is_empty() {
            return None;
        }
        Some(self.table[rng.random_range(0..self.table.len())])
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn note_tables() {
        let major = ScalePreset::Major.intervals();
        assert_eq!(build_note_table(major, 0, 0, 12), vec![0, 2, 4, 5, 7, 9, 11, 12]);
        assert_eq!(build_note_table(major, 0, -3, 2), vec![-3, -1, 0, 2]);
        assert_eq!(build_note_table(major, 2, 0, 5), vec![1, 2, 4]);
        // swapped bounds
        assert_eq!(build_note_table(major, 0, 4, 0), vec![0, 2, 4]);
        assert!(build_note_table(&[], 0, 0, 12).is_empty());
        // duplicated degrees
        assert_eq!(build_note_table(&[0, 0, 12], 0, 0, 12), vec![0, 12]);

        // extreme bounds are limited to the note span
        let chromatic = ScalePreset::Chromatic.intervals();
        let table = build_note_table(chromatic, i32::MAX, i32::MIN, i32::MAX);
        assert_eq!(table.first(), Some(&-MAX_NOTE_SPAN));
        assert_eq!(table.last(), Some(&MAX_NOTE_SPAN));
        assert_eq!(table.len(), 2 * MAX_NOTE_SPAN as usize + 1);
        assert!(build_note_table(&[i32::MAX, i32::MIN], 0, -12, 12).is_empty());
    }

    #[test]
    fn note_selection() {
        let table = [0, 2, 4, 5, 7, 9, 11, 12];
        assert_eq!(select_arp_notes(&table, 2), vec![0, 12]);
        assert_eq!(select_arp_notes(&table, 4), vec![0, 4, 9, 12]);
        assert_eq!(select_arp_notes(&table, 1), vec![0]);
        assert!(select_arp_notes(&table, 0).is_empty());
        assert!(select_arp_notes(&[], 4).is_empty());
    }

    #[test]
    fn permutations() {
        assert_eq!(get_permutations(0), vec![Vec::<usize>::new()]);
        assert_eq!(
            get_permutations(3),
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
        let all = get_permutations(4);
        assert_eq!(all.len(), 24);
        for (k, permutation) in all.iter().enumerate() {
            assert_eq!(&nth_permutation(4, k), permutation);
        }
        assert_eq!(nth_permutation(4, 24), all[0]);
    }

    #[test]
    fn pattern_mutes_are_padded() {
        let pattern = ArpPattern::new(vec![0, 1, 2], vec![true]);
        assert_eq!(pattern.mutes(), &[true, false, false]);
        assert_eq!(pattern.len(), 3);
    }

    #[test]
    fn sequence_playback() {
        let config = ArpConfig::default().with_range(0, 12).with_steps(3);
        let mut state = ArpState::new(&config);
        let notes = (0..4)
            .filter_map(|_| state.next_step())
            .map(|step| step.semitones)
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![0, 7, 12, 0]);

        state.reset();
        assert_eq!(state.next_step().map(|s| s.semitones), Some(0));

        let mut state = ArpState::new(&config.clone().with_playback(ArpPlayback::Backward));
        let notes = (0..4)
            .filter_map(|_| state.next_step())
            .map(|step| step.semitones)
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![12, 7, 0, 12]);

        let mut state = ArpState::new(&config.clone().with_playback(ArpPlayback::PingPong));
        let notes = (0..6)
            .filter_map(|_| state.next_step())
            .map(|step| step.semitones)
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![0, 7, 12, 7, 0, 7]);

        // style selects a permutation of the selected notes
        let mut state = ArpState::new(&config.with_style(5));
        let notes = (0..3)
            .filter_map(|_| state.next_step())
            .map(|step| step.semitones)
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![12, 7, 0]);
    }

    #[test]
    fn custom_pattern() {
        let config = ArpConfig::default()
            .with_range(0, 12)
            .with_pattern(ArpPattern::new(vec![0, 2, 9], vec![false, true]));
        let mut state = ArpState::new(&config);
        assert_eq!(
            state.next_step(),
            Some(ArpStep {
                semitones: 0,
                muted: false
            })
        );
        assert_eq!(
            state.next_step(),
            Some(ArpStep {
                semitones: 4,
                muted: true
            })
        );
        // wraps around the note table
        assert_eq!(
            state.next_step(),
            Some(ArpStep {
                semitones: 2,
                muted: false
            })
        );
    }

    #[test]
    fn random_notes() {
        let config = ArpConfig::default().with_mode(ArpMode::RandomNote);
        let state = ArpState::new(&config);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            let note = state.random_note(&mut rng).unwrap();
            assert!(state.note_table().contains(&note));
        }
        let empty = ArpState::new(&ArpConfig {
            scale: Vec::new(),
            ..ArpConfig::default()
        });
        assert_eq!(empty.random_note(&mut rng), None);
        assert!(empty.sequence().is_empty());
    }
}
