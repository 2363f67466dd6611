#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use drum_coach::error::DeviceError;
use drum_coach::loops::audio::{AudioDevice, Clip, TriggerId};
use drum_coach::loops::visual::{Color, Point3, RenderSink};

/// 记录所有预约与取消的设备，记录可在装箱后通过共享句柄读取
#[derive(Clone, Default)]
pub struct RecordingDevice {
    pub log: Arc<Mutex<DeviceLog>>,
}

#[derive(Default, Debug)]
pub struct DeviceLog {
    pub starts: Vec<(TriggerId, Clip, f64)>,
    pub cancelled: Vec<TriggerId>,
}

impl RecordingDevice {
    pub fn starts(&self) -> Vec<(Clip, f64)> {
        let log = self.log.lock().unwrap();
        log.starts.iter().map(|(_, clip, at)| (*clip, *at)).collect()
    }

    pub fn cancelled(&self) -> usize {
        self.log.lock().unwrap().cancelled.len()
    }
}

impl AudioDevice for RecordingDevice {
    fn start_at(&mut self, clip: Clip, at: f64) -> Result<TriggerId, DeviceError> {
        let mut log = self.log.lock().unwrap();
        let id = TriggerId(log.starts.len() as u64);
        log.starts.push((id, clip, at));
        Ok(id)
    }

    fn cancel(&mut self, id: TriggerId) {
        self.log.lock().unwrap().cancelled.push(id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawnRing {
    pub at: Point3,
    pub inner: f32,
    pub outer: f32,
    pub color: Color,
    pub alpha: f32,
}

#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<Vec<DrawnRing>>,
    current: Vec<DrawnRing>,
}

impl RecordingSink {
    /// 结束当前帧
    pub fn end_frame(&mut self) {
        let frame = std::mem::take(&mut self.current);
        self.frames.push(frame);
    }

    pub fn pending(&self) -> &[DrawnRing] {
        &self.current
    }
}

impl RenderSink for RecordingSink {
    fn draw_ring(
        &mut self,
        at: Point3,
        inner_radius: f32,
        outer_radius: f32,
        color: Color,
        alpha: f32,
    ) {
        self.current.push(DrawnRing {
            at,
            inner: inner_radius,
            outer: outer_radius,
            color,
            alpha,
        });
    }
}
