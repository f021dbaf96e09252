use crate::Arbitrary;
use crate::DIE_BITS;
use crate::DiceCount;
use crate::FaceValue;
use crate::MAX_DICE;
use crate::Points;

/// what a player last did, packed alongside the rest of the state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    #[default]
    None,
    Guess,
    CallLiar,
    Reserved,
}

/// 2-bit wire encoding
impl From<u32> for ActionKind {
    fn from(bits: u32) -> Self {
        match bits & 0x3 {
            1 => Self::Guess,
            2 => Self::CallLiar,
            3 => Self::Reserved,
            _ => Self::None,
        }
    }
}
impl From<ActionKind> for u32 {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::None => 0,
            ActionKind::Guess => 1,
            ActionKind::CallLiar => 2,
            ActionKind::Reserved => 3,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LastAction {
    pub kind: ActionKind,
    pub dice_count: DiceCount,
    pub face_value: FaceValue,
}

impl LastAction {
    pub fn guess(dice_count: DiceCount, face_value: FaceValue) -> Self {
        Self {
            kind: ActionKind::Guess,
            dice_count,
            face_value,
        }
    }

    pub fn call_liar() -> Self {
        Self {
            kind: ActionKind::CallLiar,
            dice_count: 0,
            face_value: 0,
        }
    }
}

/// CompactState is a bitstring of one player's whole turn state
/// stored as a u32
///
/// low to high: five 3-bit dice (face - 1; `111` reserved), 4 bits of
/// points, 3 bits of dice count, the active flag, then the last action
/// (2-bit kind, 4-bit count, 3-bit face). the word is the wire format;
/// the u32 isomorphism IS serialization.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CompactState(u32);

const DIE_MASK: u32 = 0x7;
const POINTS_SHIFT: u32 = 15;
const POINTS_MASK: u32 = 0xF;
const COUNT_SHIFT: u32 = 19;
const COUNT_MASK: u32 = 0x7;
const ACTIVE_SHIFT: u32 = 22;
const KIND_SHIFT: u32 = 23;
const KIND_MASK: u32 = 0x3;
const ACT_COUNT_SHIFT: u32 = 25;
const ACT_COUNT_MASK: u32 = 0xF;
const ACT_FACE_SHIFT: u32 = 29;
const ACT_FACE_MASK: u32 = 0x7;

/// u32 isomorphism
/// trivial unpacking and packing
impl From<u32> for CompactState {
    fn from(word: u32) -> Self {
        Self(word)
    }
}
impl From<CompactState> for u32 {
    fn from(state: CompactState) -> Self {
        state.0
    }
}
impl From<CompactState> for i64 {
    fn from(state: CompactState) -> Self {
        state.0 as i64
    }
}
impl From<i64> for CompactState {
    fn from(word: i64) -> Self {
        Self(word as u32)
    }
}

impl CompactState {
    pub fn new() -> Self {
        Self::default()
    }

    /// invalid index or face is a masked no-op; other slots never move
    pub fn set_die(&mut self, index: usize, face: FaceValue) {
        if index >= MAX_DICE || !(1..=6).contains(&face) {
            log::warn!("rejecting die write ({}, {})", index, face);
            return;
        }
        let shift = index as u32 * DIE_BITS;
        self.0 &= !(DIE_MASK << shift);
        self.0 |= ((face as u32 - 1) & DIE_MASK) << shift;
    }

    /// face at a slot; 0 is the out-of-range sentinel
    pub fn die(&self, index: usize) -> FaceValue {
        if index >= MAX_DICE {
            return 0;
        }
        let shift = index as u32 * DIE_BITS;
        (((self.0 >> shift) & DIE_MASK) + 1) as FaceValue
    }

    pub fn dice(&self) -> [FaceValue; MAX_DICE] {
        std::array::from_fn(|i| self.die(i))
    }

    /// replace all dice and set the count to the (clamped) slice length
    pub fn set_dice(&mut self, faces: &[FaceValue]) {
        self.0 &= !((1 << POINTS_SHIFT) - 1);
        let count = faces.len().min(MAX_DICE);
        for (index, face) in faces.iter().take(count).enumerate() {
            self.set_die(index, *face);
        }
        self.set_dice_count(count as DiceCount);
    }

    pub fn points(&self) -> Points {
        ((self.0 >> POINTS_SHIFT) & POINTS_MASK) as Points
    }

    pub fn set_points(&mut self, points: Points) {
        self.0 &= !(POINTS_MASK << POINTS_SHIFT);
        self.0 |= (points as u32 & POINTS_MASK) << POINTS_SHIFT;
    }

    pub fn dice_count(&self) -> DiceCount {
        ((self.0 >> COUNT_SHIFT) & COUNT_MASK) as DiceCount
    }

    pub fn set_dice_count(&mut self, count: DiceCount) {
        self.0 &= !(COUNT_MASK << COUNT_SHIFT);
        self.0 |= (count as u32 & COUNT_MASK) << COUNT_SHIFT;
    }

    pub fn is_active(&self) -> bool {
        (self.0 >> ACTIVE_SHIFT) & 1 == 1
    }

    /// deactivating zeroes points: an eliminated player holds none
    pub fn set_active(&mut self, active: bool) {
        if active {
            self.0 |= 1 << ACTIVE_SHIFT;
        } else {
            self.0 &= !(1 << ACTIVE_SHIFT);
            self.set_points(0);
        }
    }

    pub fn last_action(&self) -> LastAction {
        LastAction {
            kind: ActionKind::from((self.0 >> KIND_SHIFT) & KIND_MASK),
            dice_count: ((self.0 >> ACT_COUNT_SHIFT) & ACT_COUNT_MASK) as DiceCount,
            face_value: ((self.0 >> ACT_FACE_SHIFT) & ACT_FACE_MASK) as FaceValue,
        }
    }

    pub fn set_last_action(&mut self, action: LastAction) {
        self.0 &= !(KIND_MASK << KIND_SHIFT);
        self.0 &= !(ACT_COUNT_MASK << ACT_COUNT_SHIFT);
        self.0 &= !(ACT_FACE_MASK << ACT_FACE_SHIFT);
        self.0 |= u32::from(action.kind) << KIND_SHIFT;
        self.0 |= (action.dice_count as u32 & ACT_COUNT_MASK) << ACT_COUNT_SHIFT;
        let face = if (1..=6).contains(&action.face_value) {
            action.face_value as u32
        } else {
            0
        };
        self.0 |= (face & ACT_FACE_MASK) << ACT_FACE_SHIFT;
    }

    pub fn is_eliminated(&self) -> bool {
        self.points() == 0
    }
}

impl std::fmt::Display for CompactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.dice_count() as usize;
        let dice = self
            .dice()
            .iter()
            .take(count)
            .map(|d| d.to_string())
            .collect::<Vec<String>>()
            .join(",");
        write!(
            f,
            "[{}] pts={} {}",
            dice,
            self.points(),
            if self.is_active() { "live" } else { "out" },
        )
    }
}

impl Arbitrary for CompactState {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let mut state = Self::new();
        let count = rng.random_range(0..=MAX_DICE);
        let faces = (0..count)
            .map(|_| rng.random_range(1..=6))
            .collect::<Vec<FaceValue>>();
        state.set_dice(&faces);
        state.set_active(rng.random_bool(0.8));
        if state.is_active() {
            state.set_points(rng.random_range(0..=5));
        }
        match rng.random_range(0..3) {
            0 => {}
            1 => state.set_last_action(LastAction::guess(
                rng.random_range(1..=10),
                rng.random_range(1..=6),
            )),
            _ => state.set_last_action(LastAction::call_liar()),
        }
        state
    }
}
