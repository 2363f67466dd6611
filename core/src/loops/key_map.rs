//! 按键映射：将原始输入转换为轨道击打
//!
//! 负责维护配置的 MIDI 音符与按键代码到轨道的映射，并将原始输入事件转换为判定输入。

use std::collections::HashMap;

use crate::chart::pattern::Lane;
use crate::config::LaneConfig;
use crate::loops::{InputMsg, RawInputMsg, RawKeyCode};

/// 鼓组通道（第 10 通道）的 Note On 状态字节
pub const DRUM_NOTE_ON: u8 = 0x99;

/// 按键映射器
pub struct KeyMap {
    /// MIDI 音符号到轨道的映射
    midi: HashMap<u8, Lane>,
    /// 按键代码（含轨道名本身）到轨道的映射
    keys: HashMap<String, Lane>,
}

impl KeyMap {
    /// 从轨道配置创建映射器
    ///
    /// 轨道名本身总是可以作为按键代码使用。
    #[must_use]
    pub fn new(lanes: &[LaneConfig]) -> Self {
        let mut midi = HashMap::new();
        let mut keys = HashMap::new();
        for lane in lanes {
            for note in &lane.midi {
                midi.insert(*note, lane.id.clone());
            }
            keys.insert(lane.id.as_str().to_owned(), lane.id.clone());
            for code in &lane.keys {
                keys.insert(code.clone(), lane.id.clone());
            }
        }
        Self { midi, keys }
    }

    /// 查询 MIDI 音符号对应的轨道
    #[must_use]
    pub fn lane_for_midi(&self, note: u8) -> Option<&Lane> {
        self.midi.get(&note)
    }

    /// 将原始输入消息转换为语义化输入消息
    ///
    /// 仅鼓组通道上力度大于 0 的 Note On 视为击打；其余 MIDI 消息与未映射的按键返回 `None`。
    #[must_use]
    pub fn convert(&self, raw_msg: RawInputMsg) -> Option<InputMsg> {
        match raw_msg {
            RawInputMsg::Midi {
                status,
                note,
                velocity,
            } => {
                if status != DRUM_NOTE_ON || velocity == 0 {
                    return None;
                }
                self.midi.get(&note).cloned().map(InputMsg::Strike)
            }
            RawInputMsg::Key { code } => {
                let RawKeyCode(key_str) = code;
                self.keys.get(&key_str).cloned().map(InputMsg::Strike)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sys;

    fn default_map() -> KeyMap {
        KeyMap::new(&Sys::default().lanes)
    }

    #[test]
    fn test_midi_note_on_maps_to_lane() {
        let key_map = default_map();
        let msg = RawInputMsg::Midi {
            status: DRUM_NOTE_ON,
            note: 36,
            velocity: 100,
        };
        assert_eq!(key_map.convert(msg), Some(InputMsg::Strike(Lane::from("kick"))));

        let msg = RawInputMsg::Midi {
            status: DRUM_NOTE_ON,
            note: 43,
            velocity: 64,
        };
        assert_eq!(
            key_map.convert(msg),
            Some(InputMsg::Strike(Lane::from("hihatOpen")))
        );
    }

    #[test]
    fn test_midi_ignores_release_and_other_channels() {
        let key_map = default_map();
        // 力度为 0 的 Note On 等同于 Note Off
        let zero_velocity = RawInputMsg::Midi {
            status: DRUM_NOTE_ON,
            note: 36,
            velocity: 0,
        };
        assert_eq!(key_map.convert(zero_velocity), None);

        let channel_one = RawInputMsg::Midi {
            status: 0x90,
            note: 36,
            velocity: 100,
        };
        assert_eq!(key_map.convert(channel_one), None);
    }

    #[test]
    fn test_key_codes_and_lane_names() {
        let key_map = default_map();
        let by_name = RawInputMsg::Key {
            code: RawKeyCode("snare".into()),
        };
        assert_eq!(
            key_map.convert(by_name),
            Some(InputMsg::Strike(Lane::from("snare")))
        );

        let by_key = RawInputMsg::Key {
            code: RawKeyCode("KeyF".into()),
        };
        assert_eq!(
            key_map.convert(by_key),
            Some(InputMsg::Strike(Lane::from("kick")))
        );

        // 测试未映射的按键
        let unmapped = RawInputMsg::Key {
            code: RawKeyCode("KeyZ".into()),
        };
        assert_eq!(key_map.convert(unmapped), None);
    }
}
