// 该文件是 Shouyu （手语） 项目的一部分。
// src/task.rs - 命令行推理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{
  input::InputFrame,
  model::Classifier,
  output::Render,
  service::{PredictionResult, PredictionService},
};

pub trait Task<I, C, O>: Sized {
  type Error;
  fn run_task(self, input: I, service: &PredictionService<C>, output: O)
  -> Result<(), Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub frames: usize,
  pub failures: usize,
}

pub struct OneShotTask;

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<InputFrame, IE>>,
  C: Classifier,
  O: Render<InputFrame, PredictionResult, Error = RE>,
> Task<I, C, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    service: &PredictionService<C>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = service.predict_image(&frame.image)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;

    Ok(())
  }
}

/// 对同一帧重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<InputFrame, IE>>,
  C: Classifier,
  O: Render<InputFrame, PredictionResult, Error = RE>,
> Task<I, C, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    service: &PredictionService<C>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    let tensor = service.preprocessor().preprocess(&frame.image)?;
    info!("输入帧获取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat_times);
    let mut first: Option<PredictionResult> = None;
    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let result = service.predict_tensor(&tensor)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);

      match &first {
        Some(expected) if *expected != result => {
          warn!("({})推理结果不一致: {:?} != {:?}", i, result, expected);
        }
        Some(_) => {}
        None => {
          output.render_result(&frame, &result)?;
          first = Some(result);
        }
      }
    }

    // 前两次通常包含预热开销
    let skip = if times.len() > 2 { 2 } else { 0 };
    let measured = &times[skip..];
    warn!(
      "平均推理时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 逐帧处理，单帧失败只记录不中断；`stop` 置位后退出
  pub fn process<I, IE, C, O, RE>(
    &self,
    input: I,
    service: &PredictionService<C>,
    output: &O,
    stop: &AtomicBool,
  ) -> TaskSummary
  where
    I: Iterator<Item = Result<InputFrame, IE>>,
    IE: std::fmt::Display,
    C: Classifier,
    O: Render<InputFrame, PredictionResult, Error = RE>,
    RE: std::fmt::Display,
  {
    let mut summary = TaskSummary::default();
    let mut now = std::time::Instant::now();
    for (frame_index, frame) in input.enumerate() {
      let frame_index = frame_index + 1;
      info!("处理第 {} 帧图像", frame_index);
      summary.frames += 1;

      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("读取第 {} 帧失败: {}", frame_index, e);
          summary.failures += 1;
          continue;
        }
      };

      match service.predict_image(&frame.image) {
        Ok(result) => {
          let elapsed_a = now.elapsed();
          if let Err(e) = output.render_result(&frame, &result) {
            warn!("输出第 {} 帧结果失败: {}", frame_index, e);
            summary.failures += 1;
          }
          let elapsed_b = now.elapsed();
          info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
        }
        Err(e) => {
          warn!("第 {} 帧推理失败: {}", frame_index, e);
          summary.failures += 1;
        }
      }
      now = std::time::Instant::now();

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }
    summary
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<InputFrame, IE>>,
  C: Classifier,
  O: Render<InputFrame, PredictionResult, Error = RE>,
> Task<I, C, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, service: &PredictionService<C>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let stop = Arc::new(AtomicBool::new(false));

    let flag = stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      flag.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let summary = self.process(input, service, &output, &stop);
    info!(
      "任务完成，共 {} 帧，失败 {} 帧",
      summary.frames, summary.failures
    );
    Ok(())
  }
}
