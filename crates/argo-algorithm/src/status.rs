//! Soundness and precision bookkeeping for algorithm results
//!
//! Every [`crate::Algorithm`] reports an [`AlgorithmStatus`] that describes how
//! far its result can be trusted. A status records whether a decision about
//! the property has been made at all (`checked`), whether a "property holds"
//! result may be trusted as a proof (`sound`), and whether a "property is
//! violated" result may be trusted as a counterexample (`precise`).
//!
//! Soundness and precision are only meaningful for checked results, the
//! constructor enforces `sound => checked` and `precise => checked`.

use std::{error, fmt, str::FromStr};

/// Status of the result of an algorithm run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmStatus {
    checked: bool,
    sound: bool,
    precise: bool,
}

impl AlgorithmStatus {
    /// No decision about the property has been made
    pub const NO_PROPERTY_CHECKED: Self = Self::new(false, false, false);
    /// The result is a trustworthy proof and a trustworthy counterexample
    pub const SOUND_AND_PRECISE: Self = Self::new(true, true, true);
    /// Only a reported counterexample can be trusted
    pub const UNSOUND_AND_PRECISE: Self = Self::new(true, false, true);
    /// Only a reported proof can be trusted
    pub const SOUND_AND_IMPRECISE: Self = Self::new(true, true, false);
    /// Neither a proof nor a counterexample can be trusted
    pub const UNSOUND_AND_IMPRECISE: Self = Self::new(true, false, false);

    /// Create a new status
    ///
    /// If `checked` is `false`, `sound` and `precise` are forced to `false`.
    pub const fn new(checked: bool, sound: bool, precise: bool) -> Self {
        Self {
            checked,
            sound: checked && sound,
            precise: checked && precise,
        }
    }

    /// Whether a decision about the property has been made
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Whether a proof can be trusted
    pub fn is_sound(&self) -> bool {
        self.sound
    }

    /// Whether a counterexample can be trusted
    pub fn is_precise(&self) -> bool {
        self.precise
    }

    /// Combine the status of two algorithm runs
    ///
    /// The combined status is only as strong as the weaker of both, and only
    /// checked if both runs made a decision. `combine` is associative and
    /// commutative with [`AlgorithmStatus::SOUND_AND_PRECISE`] as identity.
    pub fn combine(self, other: Self) -> Self {
        Self::new(
            self.checked && other.checked,
            self.sound && other.sound,
            self.precise && other.precise,
        )
    }

    /// Replace the soundness of the status
    pub fn with_sound(self, sound: bool) -> Self {
        Self::new(self.checked, sound, self.precise)
    }

    /// Replace the precision of the status
    pub fn with_precise(self, precise: bool) -> Self {
        Self::new(self.checked, self.sound, precise)
    }
}

impl Default for AlgorithmStatus {
    fn default() -> Self {
        Self::NO_PROPERTY_CHECKED
    }
}

impl fmt::Display for AlgorithmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.checked, self.sound, self.precise) {
            (false, _, _) => write!(f, "no-property-checked"),
            (true, true, true) => write!(f, "sound-and-precise"),
            (true, false, true) => write!(f, "unsound-and-precise"),
            (true, true, false) => write!(f, "sound-and-imprecise"),
            (true, false, false) => write!(f, "unsound-and-imprecise"),
        }
    }
}

impl FromStr for AlgorithmStatus {
    type Err = UnknownStatusError;

    /// Parse one of the canonical status names as produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "no-property-checked" => Ok(Self::NO_PROPERTY_CHECKED),
            "sound-and-precise" => Ok(Self::SOUND_AND_PRECISE),
            "unsound-and-precise" => Ok(Self::UNSOUND_AND_PRECISE),
            "sound-and-imprecise" => Ok(Self::SOUND_AND_IMPRECISE),
            "unsound-and-imprecise" => Ok(Self::UNSOUND_AND_IMPRECISE),
            _ => Err(UnknownStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatusError(String);

impl fmt::Display for UnknownStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown algorithm status '{}'. Expected one of: no-property-checked, sound-and-precise, unsound-and-precise, sound-and-imprecise, unsound-and-imprecise",
            self.0
        )
    }
}

impl error::Error for UnknownStatusError {}

#[cfg(test)]
mod tests {
    use crate::status::{AlgorithmStatus, UnknownStatusError};

    const ALL: [AlgorithmStatus; 5] = [
        AlgorithmStatus::NO_PROPERTY_CHECKED,
        AlgorithmStatus::SOUND_AND_PRECISE,
        AlgorithmStatus::UNSOUND_AND_PRECISE,
        AlgorithmStatus::SOUND_AND_IMPRECISE,
        AlgorithmStatus::UNSOUND_AND_IMPRECISE,
    ];

    #[test]
    fn test_unchecked_forces_unsound_and_imprecise() {
        let status = AlgorithmStatus::new(false, true, true);

        assert!(!status.is_checked());
        assert!(!status.is_sound());
        assert!(!status.is_precise());
        assert_eq!(status, AlgorithmStatus::NO_PROPERTY_CHECKED);
    }

    #[test]
    fn test_canonical_values() {
        assert_eq!(
            AlgorithmStatus::SOUND_AND_IMPRECISE,
            AlgorithmStatus::new(true, true, false)
        );
        assert_eq!(
            AlgorithmStatus::UNSOUND_AND_PRECISE,
            AlgorithmStatus::new(true, false, true)
        );
        assert_eq!(AlgorithmStatus::default(), AlgorithmStatus::NO_PROPERTY_CHECKED);
    }

    #[test]
    fn test_combine_is_conjunction() {
        assert_eq!(
            AlgorithmStatus::UNSOUND_AND_PRECISE.combine(AlgorithmStatus::SOUND_AND_IMPRECISE),
            AlgorithmStatus::UNSOUND_AND_IMPRECISE
        );
        assert_eq!(
            AlgorithmStatus::SOUND_AND_PRECISE.combine(AlgorithmStatus::NO_PROPERTY_CHECKED),
            AlgorithmStatus::NO_PROPERTY_CHECKED
        );
    }

    #[test]
    fn test_with_sound_and_with_precise() {
        let status = AlgorithmStatus::UNSOUND_AND_PRECISE
            .with_sound(true)
            .with_precise(false);
        assert_eq!(status, AlgorithmStatus::SOUND_AND_IMPRECISE);

        // an unchecked status cannot become sound
        assert_eq!(
            AlgorithmStatus::NO_PROPERTY_CHECKED.with_sound(true),
            AlgorithmStatus::NO_PROPERTY_CHECKED
        );
    }

    #[test]
    fn test_display_and_parse() {
        for status in ALL {
            let parsed: AlgorithmStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }

        assert_eq!(
            "SOUND_AND_PRECISE".parse::<AlgorithmStatus>(),
            Ok(AlgorithmStatus::SOUND_AND_PRECISE)
        );
        assert_eq!(
            "maybe".parse::<AlgorithmStatus>(),
            Err(UnknownStatusError("maybe".to_string()))
        );
    }
}
