//! 比较不同立方块重叠比例下的拼接质量与耗时.
//!
//! 数据集位置见 [`utils::loader::test_dir_from_env_or_home`].

mod predictor;
mod result;
mod runner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let result = runner::run()?;
    result.analyze()?;
    Ok(())
}
