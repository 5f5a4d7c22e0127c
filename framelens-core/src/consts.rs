/// Frames sampled per second of input video.
///
/// Three frames a second keeps the hosted-inference bill and batch
/// latency reasonable while still tracking scene changes; the output
/// video is reassembled at the same rate so playback speed matches the
/// source.
pub const SAMPLING_FPS: u32 = 3;

/// Bounded worker pool size for per-image inference requests.
///
/// Each vision service receives at most this many in-flight requests
/// for one batch. Completions arrive out of order; the driver re-sorts
/// results by frame identity before writing output.
pub const INFERENCE_WORKERS: usize = 16;

/// Maximum number of status polls for an asynchronous inference job
/// before it is declared timed out.
pub const MAX_POLL_RETRIES: u32 = 5;

/// Fixed delay between consecutive status polls, in milliseconds.
pub const POLL_DELAY_MS: u64 = 1000;

/// Number of fixed-position trailing fields in a KITTI-like label row.
///
/// Everything before these fields is the (possibly multi-token) class
/// name. Within the trailing fields, indices 3..7 are the bounding box
/// and the last is the confidence score.
pub const KITTI_FIELDS: usize = 15;

/// Name of the function every synthesized snippet must define.
pub const ANALYSIS_FUNCTION_NAME: &str = "postprocessor";

/// Memory ceiling for one loaded analysis function's runtime.
pub const ANALYSIS_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Stack ceiling for one loaded analysis function's runtime.
pub const ANALYSIS_STACK_LIMIT: usize = 1024 * 1024;

/// Environment variable holding the NVCF API key.
pub const API_KEY_ENV: &str = "NVCF_API_KEY";

/// Environment variable pointing at a TTF font used for frame overlay.
/// Overlay is skipped when unset.
pub const OVERLAY_FONT_ENV: &str = "FRAMELENS_FONT";

/// OpenAI-compatible chat completion endpoint for the language models.
pub const LLM_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Hosted open-vocabulary detection endpoint.
pub const DETECTION_URL: &str = "https://ai.api.nvidia.com/v1/cv/nvidia/nv-grounding-dino";

/// Hosted optical character/region detection endpoint.
pub const TEXT_REGION_URL: &str = "https://ai.api.nvidia.com/v1/cv/nvidia/ocdrnet";

/// NVCF asset registration endpoint.
pub const ASSETS_URL: &str = "https://api.nvcf.nvidia.com/v2/nvcf/assets";

/// NVCF status endpoint for pending (202) jobs; the request id is
/// appended.
pub const POLLING_URL: &str = "https://api.nvcf.nvidia.com/v2/nvcf/pexec/status/";

/// Model used to synthesize the analysis function.
pub const CODEGEN_MODEL: &str = "mistralai/codestral-22b-instruct-v0.1";

/// Model used to extract noun chunks from the question.
pub const NOUN_CHUNK_MODEL: &str = "meta/llama3-70b-instruct";

/// Prompt template for analysis-function synthesis. `{metadata}` is
/// replaced with one representative frame's fused records as JSON and
/// `{question}` with the user question.
pub const CODEGEN_PROMPT: &str = "Return a single JavaScript function called postprocessor that \
would help answer the question {question}. The input to the function is the output of a 2D \
object detection model: an array of objects like {metadata}. Each object has a class_name \
string, a bbox array in XYXY pixel format, a confidence score, and an object_text field \
holding any words recognized inside the bounding box. The function must take exactly one \
parameter, must tolerate missing fields, and must return a JSON-serializable value. Do not \
define more than one function. Do not use require or import. Output only the function.";

/// Prompt template for noun-chunk extraction. `{question}` is replaced
/// with the user question.
pub const NOUN_CHUNK_PROMPT: &str = "Noun chunks are base noun phrases: a noun plus the words \
describing it, for example \"the lavish green grass\". Find all noun chunks in the given text \
and answer only with JSON of the form {\"noun_chunks\": [<noun chunks>]}. Exclude abstract \
nouns like \"this image\" and anything not physically present in the real world. Convert \
plural noun chunks to singular, for example \"forklifts\" to \"forklift\". Do not include any \
explanation. Given text: {question}";
