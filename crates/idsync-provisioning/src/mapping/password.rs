//! Password generation for resources that require one.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ProvisioningError, Result};

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SPECIAL: &[u8] = b"!#$%&*+-=?@_";

/// Produces passwords when none was supplied.
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> Result<String>;
}

/// Random password with at least one character of each class.
#[derive(Debug, Clone)]
pub struct RandomPasswordGenerator {
    length: usize,
}

impl RandomPasswordGenerator {
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomPasswordGenerator {
    fn default() -> Self {
        Self::new(16)
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self) -> Result<String> {
        let classes = [LOWER, UPPER, DIGITS, SPECIAL];
        if self.length < classes.len() {
            return Err(ProvisioningError::configuration(format!(
                "password length {} cannot hold every character class",
                self.length
            )));
        }

        let mut rng = rand::thread_rng();
        let mut chars: Vec<u8> = classes
            .iter()
            .map(|class| class[rng.gen_range(0..class.len())])
            .collect();

        let all: Vec<u8> = classes.concat();
        while chars.len() < self.length {
            chars.push(all[rng.gen_range(0..all.len())]);
        }
        chars.shuffle(&mut rng);

        Ok(chars.into_iter().map(char::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_has_every_class() {
        let password = RandomPasswordGenerator::default().generate().unwrap();
        assert_eq!(password.len(), 16);
        assert!(password.bytes().any(|b| LOWER.contains(&b)));
        assert!(password.bytes().any(|b| UPPER.contains(&b)));
        assert!(password.bytes().any(|b| DIGITS.contains(&b)));
        assert!(password.bytes().any(|b| SPECIAL.contains(&b)));
    }

    #[test]
    fn test_too_short_fails() {
        assert!(RandomPasswordGenerator::new(3).generate().is_err());
    }

    #[test]
    fn test_passwords_differ() {
        let generator = RandomPasswordGenerator::default();
        assert_ne!(generator.generate().unwrap(), generator.generate().unwrap());
    }
}
