use std::path::PathBuf;
use std::time::Instant;

use kokoro_tts_server::{
    engines::kokoro::{KokoroEngine, KokoroModelParams},
    EngineConfig, ModelManager,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let models = ModelManager::new();
    let engine = KokoroEngine::new(PathBuf::from("models/kokoro"), KokoroModelParams::default());

    let load_start = Instant::now();
    let context = models.initialize(&engine, &EngineConfig::default())?;
    println!("Model loaded in {:.2?} on {}", load_start.elapsed(), context.device());
    println!("Default voice: {}", context.voices().default_voice());

    let text = "你好！这是 Kokoro，一个支持多种语言的文本转语音模型。";

    let synth_start = Instant::now();
    let wav = context.pipeline().run(text, "zf_001", "zh")?;
    println!("Synthesized {} WAV bytes in {:.2?}", wav.len(), synth_start.elapsed());

    std::fs::write("output.wav", &wav)?;
    println!("Saved to output.wav");

    models.teardown();
    Ok(())
}
