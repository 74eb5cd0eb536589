//! Module defining the recognized obfuscation options and profile presets.

use crate::error::ObfuscateError;
use std::fmt;
use std::str::FromStr;

/// A named preset of options.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Profile {
    /// Renaming and string encryption only.
    Basic,
    /// Adds control flow, dead code, and the anti-debug guard.
    Standard,
    /// Adds the VM wrap, anti-tampering, and integrity checks.
    Professional,
    /// Adds environment detection and timing protection.
    Enterprise,
    /// Everything, plus stack and opcode randomization.
    Military,
}

impl Profile {
    /// All profiles, weakest first.
    pub const ALL: [Self; 5] = [
        Self::Basic,
        Self::Standard,
        Self::Professional,
        Self::Enterprise,
        Self::Military,
    ];

    /// The profile's external name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Military => "military",
        }
    }

    /// The profile's advisory obfuscation level.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Basic => 2,
            Self::Standard => 5,
            Self::Professional => 7,
            Self::Enterprise => 9,
            Self::Military => 10,
        }
    }

    /// The weakest profile whose advisory level covers `level`.
    #[must_use]
    pub fn for_level(level: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| level <= p.level())
            .unwrap_or(Self::Military)
    }

    /// Enable this profile's techniques on `options`.  Techniques are
    /// cumulative: each tier includes everything below it.
    fn apply(self, options: &mut Options) {
        options.variable_renaming = true;
        options.string_encryption = true;
        if self >= Self::Standard {
            options.control_flow_obfuscation = true;
            options.dead_code_injection = true;
            options.anti_debug = true;
        }
        if self >= Self::Professional {
            options.vm_obfuscation = true;
            options.anti_tampering = true;
            options.integrity_checks = true;
        }
        if self >= Self::Enterprise {
            options.environment_detection = true;
            options.timing_protection = true;
        }
        if self >= Self::Military {
            options.memory_protection = true;
            options.stack_randomization = true;
            options.opcode_randomization = true;
        }
        options.obfuscation_level = self.level();
    }
}

impl PartialOrd for Profile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Profile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level().cmp(&other.level())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or(())
    }
}

/// The recognized option keys of one obfuscation request.
///
/// Every field maps to one externally recognized key; unknown keys are
/// rejected by [`Options::set`] with
/// [`InvalidOption`][ObfuscateError::InvalidOption].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Options {
    /// Replace string literals with decoder calls.
    pub string_encryption: bool,
    /// Alpha-rename user identifiers.
    pub variable_renaming: bool,
    /// Opaque predicates and switch-dispatch flattening.
    pub control_flow_obfuscation: bool,
    /// Splice no-effect statements between real ones.
    pub dead_code_injection: bool,
    /// Compile eligible fragments to an embedded bytecode interpreter.
    pub vm_obfuscation: bool,
    /// Emit the anti-debug prologue snippet.
    pub anti_debug: bool,
    /// Emit the anti-tampering prologue snippet.
    pub anti_tampering: bool,
    /// Emit the integrity-check prologue snippet.
    pub integrity_checks: bool,
    /// Emit the environment-detection prologue snippet.
    pub environment_detection: bool,
    /// Emit the timing-protection prologue snippet.
    pub timing_protection: bool,
    /// Emit the memory-protection prologue snippet.
    pub memory_protection: bool,
    /// Shuffle the VM's register-slot naming order.
    pub stack_randomization: bool,
    /// Re-randomize VM opcode numbering per wrapped fragment instead of per
    /// run.
    pub opcode_randomization: bool,
    /// Advisory strength, 1 to 10.  Zero means "not set".
    pub obfuscation_level: u8,
    /// The preset this request was resolved from, if any.
    pub profile: Option<Profile>,
}

impl Options {
    /// Options with nothing enabled.
    #[inline(always)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options preset from a [`Profile`].
    #[must_use]
    pub fn from_profile(profile: Profile) -> Self {
        let mut options = Self::default();
        profile.apply(&mut options);
        options.profile = Some(profile);
        options
    }

    /// Set one option by its external key.  Setting `profile` or
    /// `obfuscationLevel` applies the matching preset immediately, so later
    /// individual keys override preset choices.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ObfuscateError> {
        let invalid = |reason: &str| ObfuscateError::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        };
        let parse_bool = |value: &str| match value {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(invalid("expected a boolean")),
        };

        match key {
            "stringEncryption" => self.string_encryption = parse_bool(value)?,
            "variableRenaming" => self.variable_renaming = parse_bool(value)?,
            "controlFlowObfuscation" => self.control_flow_obfuscation = parse_bool(value)?,
            "deadCodeInjection" => self.dead_code_injection = parse_bool(value)?,
            "vmObfuscation" => self.vm_obfuscation = parse_bool(value)?,
            "antiDebug" => self.anti_debug = parse_bool(value)?,
            "antiTampering" => self.anti_tampering = parse_bool(value)?,
            "integrityChecks" => self.integrity_checks = parse_bool(value)?,
            "environmentDetection" => self.environment_detection = parse_bool(value)?,
            "timingProtection" => self.timing_protection = parse_bool(value)?,
            "memoryProtection" => self.memory_protection = parse_bool(value)?,
            "stackRandomization" => self.stack_randomization = parse_bool(value)?,
            "opcodeRandomization" => self.opcode_randomization = parse_bool(value)?,
            "obfuscationLevel" => {
                let level: u8 = value
                    .parse()
                    .map_err(|_| invalid("expected an integer from 1 to 10"))?;
                if !(1..=10).contains(&level) {
                    return Err(invalid("expected an integer from 1 to 10"));
                }
                Profile::for_level(level).apply(self);
                self.obfuscation_level = level;
            }
            "profile" => {
                let profile: Profile = value
                    .parse()
                    .map_err(|_| invalid("unknown profile name"))?;
                profile.apply(self);
                self.profile = Some(profile);
            }
            _ => return Err(invalid("unrecognized option key")),
        }
        Ok(())
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ObfuscateError> {
        if self.obfuscation_level > 10 {
            return Err(ObfuscateError::InvalidOption {
                key: "obfuscationLevel".into(),
                reason: "expected an integer from 1 to 10".into(),
            });
        }
        Ok(())
    }

    /// The security-level string reported in the result record.
    #[must_use]
    pub fn security_level(&self) -> String {
        match self.profile {
            Some(profile) => profile.name().into(),
            None => "custom".into(),
        }
    }

    /// Is any anti-analysis prologue snippet requested?
    #[must_use]
    pub const fn wants_guard_prologue(&self) -> bool {
        self.anti_debug
            || self.anti_tampering
            || self.integrity_checks
            || self.environment_detection
            || self.timing_protection
            || self.memory_protection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_cumulative() {
        let basic = Options::from_profile(Profile::Basic);
        assert!(basic.variable_renaming && basic.string_encryption);
        assert!(!basic.control_flow_obfuscation && !basic.vm_obfuscation);

        let military = Options::from_profile(Profile::Military);
        assert!(military.vm_obfuscation);
        assert!(military.stack_randomization && military.opcode_randomization);
        assert_eq!(military.obfuscation_level, 10);
    }

    #[test]
    fn individual_keys_override_presets() {
        let mut options = Options::new();
        options.set("profile", "professional").expect("valid");
        options.set("vmObfuscation", "false").expect("valid");
        assert!(!options.vm_obfuscation);
        assert!(options.control_flow_obfuscation);
        assert_eq!(options.security_level(), "professional");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut options = Options::new();
        let err = options.set("turboMode", "true").expect_err("unknown key");
        assert!(matches!(
            err,
            ObfuscateError::InvalidOption { key, .. } if key == "turboMode"
        ));
        assert!(options.set("obfuscationLevel", "11").is_err());
        assert!(options.set("profile", "ultra").is_err());
        assert!(options.set("antiDebug", "maybe").is_err());
    }

    #[test]
    fn level_bundles_defaults() {
        let mut options = Options::new();
        options.set("obfuscationLevel", "5").expect("valid");
        assert!(options.control_flow_obfuscation);
        assert!(!options.vm_obfuscation);
        assert_eq!(options.obfuscation_level, 5);
        assert_eq!(options.security_level(), "custom");
    }
}
