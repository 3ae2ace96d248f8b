/// 案内メッセージの進行状態。後戻りしない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstructionState {
    #[default]
    Uninstructed,
    ToldToMoveCloser,
    ToldDistanceIsGood,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    MoveCloser { cutoff: f64 },
    DistanceGood,
}

/// Distance-based user guidance, driven by the z translation of video
/// samples that failed the stability check.
#[derive(Debug, Clone)]
pub struct Guidance {
    near_cutoff: f64,
    state: InstructionState,
}

impl Guidance {
    pub fn new(near_cutoff: f64) -> Self {
        Self {
            near_cutoff,
            state: InstructionState::Uninstructed,
        }
    }

    pub fn state(&self) -> InstructionState {
        self.state
    }

    /// Returns an instruction the first time each transition fires.
    pub fn observe_distance(&mut self, z_translation: f64) -> Option<Instruction> {
        match self.state {
            InstructionState::Uninstructed if z_translation > self.near_cutoff => {
                self.state = InstructionState::ToldToMoveCloser;
                Some(Instruction::MoveCloser {
                    cutoff: self.near_cutoff,
                })
            }
            // 少し余裕を持たせる
            InstructionState::ToldToMoveCloser if z_translation < 0.9 * self.near_cutoff => {
                self.state = InstructionState::ToldDistanceIsGood;
                Some(Instruction::DistanceGood)
            }
            _ => None,
        }
    }
}
