use std::fmt;

/// Phases a trial (or the gap between two trials) can be in.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Fixation,
    Cue,
    Stimulus,
    Feedback,
    InterTrialInterval,
    Rest,
}

impl Phase {
    /// In-trial successor. Fixation → Cue → Stimulus → Feedback, after which
    /// the trial is over and the session decides between an inter-trial
    /// interval and a rest break.
    pub fn next(&self) -> Option<Self> {
        use Phase::*;
        Some(match self {
            Fixation => Cue,
            Cue => Stimulus,
            Stimulus => Feedback,
            Feedback | InterTrialInterval | Rest => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fixation => "fixation",
            Self::Cue => "cue",
            Self::Stimulus => "stimulus",
            Self::Feedback => "feedback",
            Self::InterTrialInterval => "iti",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
