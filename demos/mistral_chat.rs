use llmgate::config::{set_debug_level, set_max_tokens, set_model, set_provider, set_temperature};
use llmgate::{logging, new_llm, Llm, LogLevel, RequestOptions};

#[tokio::main]
async fn main() {
    // Reads LLM_* variables and MISTRAL_API_KEY, then applies the options below.
    let client = new_llm([
        set_provider("mistral"),
        set_model("mistral-small-latest"),
        set_temperature(0.3),
        set_max_tokens(200),
        set_debug_level(LogLevel::Debug),
    ])
    .expect("Failed to create client");

    let _ = logging::init(llmgate::llm::LogLevel::Debug);

    match client
        .generate("Why is the sky blue? Answer in two sentences.", &RequestOptions::new())
        .await
    {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error during API call: {e}"),
    }
}
