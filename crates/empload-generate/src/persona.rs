use std::fmt;

use fake::Fake;
use fake::faker::address::raw::{BuildingNumber, CityName, StateAbbr, StreetName, ZipCode};
use fake::faker::impls::address::CityNameGenFn;
use fake::faker::internet::raw::FreeEmailProvider;
use fake::faker::name::raw::{FirstName, LastName};
use fake::faker::phone_number::raw::PhoneNumber;
use fake::locales::{Data, EN, PT_BR};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use empload_core::Gender;

/// Person attributes drawn for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub contact: Contact,
}

/// Contact details carried in the employee profile payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
}

/// Source of pseudo-random person attributes.
///
/// Implementations must draw all randomness from `rng` so generation stays
/// reproducible for a fixed seed.
pub trait PersonaProvider {
    fn persona(&mut self, rng: &mut dyn RngCore) -> Persona;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocaleKey {
    EnUs,
    PtBr,
}

impl LocaleKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "en_US" => Some(Self::EnUs),
            "pt_BR" => Some(Self::PtBr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::PtBr => "pt_BR",
        }
    }
}

impl fmt::Display for LocaleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`PersonaProvider`] backed by the `fake` crate.
#[derive(Debug, Clone, Copy)]
pub struct FakePersonaProvider {
    locale: LocaleKey,
}

impl FakePersonaProvider {
    pub fn new(locale: LocaleKey) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> LocaleKey {
        self.locale
    }
}

impl Default for FakePersonaProvider {
    fn default() -> Self {
        Self::new(LocaleKey::EnUs)
    }
}

impl PersonaProvider for FakePersonaProvider {
    fn persona(&mut self, rng: &mut dyn RngCore) -> Persona {
        match self.locale {
            LocaleKey::EnUs => draw_persona(EN, rng),
            LocaleKey::PtBr => draw_persona(PT_BR, rng),
        }
    }
}

fn draw_persona<L: Data + Copy + CityNameGenFn>(locale: L, rng: &mut dyn RngCore) -> Persona {
    let gender = if rng.random_bool(0.5) {
        Gender::Male
    } else {
        Gender::Female
    };
    let first_name: String = FirstName(locale).fake_with_rng(rng);
    let last_name: String = LastName(locale).fake_with_rng(rng);
    let provider: String = FreeEmailProvider(locale).fake_with_rng(rng);
    let number: String = BuildingNumber(locale).fake_with_rng(rng);
    let street: String = StreetName(locale).fake_with_rng(rng);

    let contact = Contact {
        email: format!(
            "{}.{}@{}",
            email_part(&first_name),
            email_part(&last_name),
            provider
        ),
        phone: PhoneNumber(locale).fake_with_rng(rng),
        street: format!("{number} {street}"),
        city: CityName(locale).fake_with_rng(rng),
        state: StateAbbr(locale).fake_with_rng(rng),
        postcode: ZipCode(locale).fake_with_rng(rng),
    };

    Persona {
        first_name,
        last_name,
        gender,
        contact,
    }
}

fn email_part(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn same_seed_same_persona() {
        let mut provider = FakePersonaProvider::default();
        let a = provider.persona(&mut ChaCha8Rng::seed_from_u64(9));
        let b = provider.persona(&mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(!a.first_name.is_empty() && !a.last_name.is_empty());
        assert!(a.contact.email.contains('@'));
    }

    #[test]
    fn pt_br_locale_is_supported() {
        let mut provider = FakePersonaProvider::new(LocaleKey::PtBr);
        let persona = provider.persona(&mut ChaCha8Rng::seed_from_u64(1));
        assert!(!persona.contact.city.is_empty());
        assert_eq!(LocaleKey::parse("pt_BR"), Some(LocaleKey::PtBr));
        assert_eq!(LocaleKey::parse("fr_FR"), None);
    }
}
