//! Map descriptors
//!
//! The lobby never reads map archives. Everything it needs about a map (the
//! identity values for MAPCHECK, the GAMEINFO flags and the slot template) is
//! described by a small JSON file.

use anyhow::{Context, Result, bail};
use protocol::constants::{MAX_SLOTS, RACE_RANDOM, RACE_SELECTABLE};
use protocol::w3gs::{GameSlot, SlotStatus};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub const SPEED_SLOW: u8 = 1;
pub const SPEED_NORMAL: u8 = 2;
pub const SPEED_FAST: u8 = 3;

pub const VIS_HIDE_TERRAIN: u8 = 1;
pub const VIS_EXPLORED: u8 = 2;
pub const VIS_ALWAYS_VISIBLE: u8 = 3;
pub const VIS_DEFAULT: u8 = 4;

pub const OBS_NONE: u8 = 1;
pub const OBS_ON_DEFEAT: u8 = 2;
pub const OBS_ALLOWED: u8 = 3;
pub const OBS_REFEREES: u8 = 4;

pub const FLAG_TEAMS_TOGETHER: u8 = 1;
pub const FLAG_FIXED_TEAMS: u8 = 2;
pub const FLAG_UNIT_SHARE: u8 = 4;
pub const FLAG_RANDOM_HERO: u8 = 8;
pub const FLAG_RANDOM_RACES: u8 = 16;

pub const OPT_MELEE: u32 = 1 << 2;
pub const OPT_FIXED_PLAYER_SETTINGS: u32 = 1 << 5;
pub const OPT_CUSTOM_FORCES: u32 = 1 << 6;

/// Map game type announced in GAMEINFO for regular (not saved) games
pub const GAME_TYPE_UNKNOWN0: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapDescriptor {
    /// In-game path, e.g. `Maps\FrozenThrone\(12)EmeraldGardens.w3x`
    pub path: String,
    pub size: [u8; 4],
    pub info: [u8; 4],
    pub crc: [u8; 4],
    pub sha1: [u8; 20],
    #[serde(default = "default_speed")]
    pub speed: u8,
    #[serde(default = "default_visibility")]
    pub visibility: u8,
    #[serde(default = "default_observers")]
    pub observers: u8,
    #[serde(default)]
    pub flags: u8,
    #[serde(default = "default_options")]
    pub options: u32,
    pub width: u16,
    pub height: u16,
    pub players: u8,
    /// `[pid, download, status, computer, team, colour, race, (computer_type), (handicap)]`
    pub slots: Vec<Vec<u8>>,
}

fn default_speed() -> u8 {
    SPEED_FAST
}

fn default_visibility() -> u8 {
    VIS_DEFAULT
}

fn default_observers() -> u8 {
    OBS_NONE
}

fn default_options() -> u32 {
    OPT_MELEE
}

impl MapDescriptor {
    /// Built-in descriptor for (12)EmeraldGardens, Warcraft III 1.24
    pub fn emerald_gardens() -> Self {
        let race = RACE_RANDOM | RACE_SELECTABLE;

        Self {
            path: r"Maps\FrozenThrone\(12)EmeraldGardens.w3x".to_string(),
            size: [174, 221, 4, 0],
            info: [251, 57, 68, 98],
            crc: [108, 250, 204, 59],
            sha1: [
                35, 81, 104, 182, 223, 63, 204, 215, 1, 17, 87, 234, 220, 66, 3, 185, 82, 99, 6,
                13,
            ],
            speed: SPEED_FAST,
            visibility: VIS_DEFAULT,
            observers: OBS_NONE,
            flags: FLAG_TEAMS_TOGETHER | FLAG_FIXED_TEAMS,
            options: OPT_MELEE,
            width: 172,
            height: 172,
            players: 12,
            slots: (0..12u8)
                .map(|i| vec![0, 255, SlotStatus::Open as u8, 0, i, i, race])
                .collect(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read map file: {:?}", path.as_ref()))?;

        let map = Self::from_json(&content)?;
        info!("Loaded map {} from {:?}", map.path, path.as_ref());
        Ok(map)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let map: MapDescriptor =
            serde_json::from_str(content).context("Failed to parse map file")?;

        // surface slot errors at load time
        map.game_slots()?;
        Ok(map)
    }

    /// Slot template in lobby order
    pub fn game_slots(&self) -> Result<Vec<GameSlot>> {
        if self.slots.is_empty() {
            bail!("map {} has no slots", self.path);
        }
        if self.slots.len() > MAX_SLOTS {
            bail!("map {} has {} slots, at most {}", self.path, self.slots.len(), MAX_SLOTS);
        }

        self.slots
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                if !(7..=9).contains(&raw.len()) {
                    bail!("slot {} has {} fields, expected 7 to 9", i, raw.len());
                }
                let status = SlotStatus::from_u8(raw[2])
                    .with_context(|| format!("slot {} has unknown status {}", i, raw[2]))?;

                let mut slot = GameSlot::new(status, raw[4], raw[5], raw[6]);
                slot.pid = raw[0];
                slot.download_status = raw[1];
                slot.computer = raw[3] != 0;
                if let Some(&computer_type) = raw.get(7) {
                    slot.computer_type = computer_type;
                }
                if let Some(&handicap) = raw.get(8) {
                    slot.handicap = handicap;
                }
                Ok(slot)
            })
            .collect()
    }

    /// GAMEINFO map flags built from speed, visibility, observers and the team flags
    pub fn game_flags(&self) -> u32 {
        let mut flags = match self.speed {
            SPEED_SLOW => 0x0000_0000,
            SPEED_NORMAL => 0x0000_0001,
            _ => 0x0000_0002,
        };

        flags |= match self.visibility {
            VIS_HIDE_TERRAIN => 0x0000_0100,
            VIS_EXPLORED => 0x0000_0200,
            VIS_ALWAYS_VISIBLE => 0x0000_0400,
            _ => 0x0000_0800,
        };

        flags |= match self.observers {
            OBS_ON_DEFEAT => 0x0000_2000,
            OBS_ALLOWED => 0x0000_3000,
            OBS_REFEREES => 0x4000_0000,
            _ => 0,
        };

        let team_flags = [
            (FLAG_TEAMS_TOGETHER, 0x0000_4000),
            (FLAG_FIXED_TEAMS, 0x0006_0000),
            (FLAG_UNIT_SHARE, 0x0100_0000),
            (FLAG_RANDOM_HERO, 0x0200_0000),
            (FLAG_RANDOM_RACES, 0x0400_0000),
        ];
        for (flag, bits) in team_flags {
            if self.flags & flag != 0 {
                flags |= bits;
            }
        }

        flags
    }

    pub fn layout_style(&self) -> u8 {
        if !self.is_custom_forces() {
            0
        } else if self.options & OPT_FIXED_PLAYER_SETTINGS == 0 {
            1
        } else {
            3
        }
    }

    pub fn is_custom_forces(&self) -> bool {
        self.options & OPT_CUSTOM_FORCES != 0
    }

    pub fn has_random_races(&self) -> bool {
        self.flags & FLAG_RANDOM_RACES != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emerald_gardens_defaults() {
        let map = MapDescriptor::emerald_gardens();
        let slots = map.game_slots().unwrap();

        assert_eq!(slots.len(), 12);
        assert!(slots.iter().all(|s| s.is_open()));
        assert_eq!(slots[5].team, 5);
        assert_eq!(slots[5].race, RACE_RANDOM | RACE_SELECTABLE);
        assert_eq!(map.game_flags(), 0x0006_4802);
        assert_eq!(map.layout_style(), 0);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "path": "Maps\\Download\\DotA.w3x",
            "size": [1, 2, 3, 4],
            "info": [5, 6, 7, 8],
            "crc": [9, 10, 11, 12],
            "sha1": [0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],
            "options": 96,
            "flags": 16,
            "width": 116,
            "height": 116,
            "players": 10,
            "slots": [[0, 255, 0, 0, 0, 1, 1, 1, 100], [0, 255, 1, 0, 1, 7, 2]]
        }"#;
        let map = MapDescriptor::from_json(json).unwrap();
        let slots = map.game_slots().unwrap();

        assert_eq!(slots[1].status, SlotStatus::Closed);
        assert_eq!(slots[1].colour, 7);
        assert_eq!(slots[1].handicap, 100);
        assert!(map.is_custom_forces());
        assert!(map.has_random_races());
        assert_eq!(map.layout_style(), 3);
        assert_eq!(map.game_flags() & 0x0400_0000, 0x0400_0000);
    }

    #[test]
    fn test_bad_slot_rejected() {
        let mut map = MapDescriptor::emerald_gardens();
        map.slots[0] = vec![0, 255, 7, 0, 0, 0, 0];
        assert!(map.game_slots().is_err());

        map.slots.clear();
        assert!(map.game_slots().is_err());
    }
}
