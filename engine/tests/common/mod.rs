//! FILENAME: tests/common/mod.rs
//! Fixtures for formula engine integration tests: a character and a party
//! implemented the way a game host would implement Environment.

#![allow(dead_code)]

use formula_engine::{Environment, EvalError, EvalResult, MapEnvironment, Value};
use std::cell::Cell;

/// A host object exposing stats to formulas. Only hitpoints are writable.
pub struct Character {
    pub name: &'static str,
    pub strength: i64,
    pub agility: i64,
    pub intelligence: i64,
    pub hitpoints: Cell<i64>,
}

impl Character {
    pub fn new(name: &'static str, strength: i64) -> Self {
        Character {
            name,
            strength,
            agility: 10,
            intelligence: 10,
            hitpoints: Cell::new(30),
        }
    }
}

impl Environment for Character {
    fn query(&self, key: &str) -> Value {
        match key {
            "name" => Value::from(self.name),
            "strength" => Value::Integer(self.strength),
            "agility" => Value::Integer(self.agility),
            "intelligence" => Value::Integer(self.intelligence),
            "hitpoints" => Value::Integer(self.hitpoints.get()),
            _ => Value::Null,
        }
    }

    fn set(&self, key: &str, value: Value) -> EvalResult<()> {
        match key {
            "hitpoints" => {
                self.hitpoints.set(value.as_int()?);
                Ok(())
            }
            _ => Err(EvalError::ReadOnly {
                key: key.to_string(),
            }),
        }
    }

    fn inputs(&self) -> Vec<String> {
        ["name", "strength", "agility", "intelligence", "hitpoints"]
            .iter()
            .map(|key| key.to_string())
            .collect()
    }
}

/// Strength 15, agility 12, everything else 10.
pub fn hero() -> Character {
    Character {
        agility: 12,
        ..Character::new("Hero", 15)
    }
}

/// Three members with strength 12, 16 and 14, plus the hero as `char`.
pub fn party() -> MapEnvironment<'static> {
    let members: Vec<Value> = [("Arne", 12), ("Bryn", 16), ("Cale", 14)]
        .into_iter()
        .map(|(name, strength)| Value::from_environment(Character::new(name, strength)))
        .collect();

    MapEnvironment::new()
        .with("members", members)
        .with("char", Value::from_environment(hero()))
}
