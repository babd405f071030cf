use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("FINSCOUT_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid FINSCOUT_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("FINSCOUT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_TIMEOUT_LLM") {
            match v.parse::<u64>() {
                Ok(secs) => self.timeouts.llm_seconds = secs,
                Err(_) => tracing::warn!("ignoring invalid FINSCOUT_TIMEOUT_LLM value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("FINSCOUT_TIMEOUT_EMBEDDING") {
            match v.parse::<u64>() {
                Ok(secs) => self.timeouts.embedding_seconds = secs,
                Err(_) => tracing::warn!("ignoring invalid FINSCOUT_TIMEOUT_EMBEDDING value: {v}"),
            }
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("FINSCOUT_PIPELINE_MAX_TURNS") {
            match v.parse::<usize>() {
                Ok(turns) => self.pipeline.max_turns = turns,
                Err(_) => tracing::warn!("ignoring invalid FINSCOUT_PIPELINE_MAX_TURNS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("FINSCOUT_PIPELINE_MIN_QUERIES")
            && let Ok(n) = v.parse::<usize>()
        {
            self.pipeline.min_distinct_queries = n;
        }
        if let Ok(v) = std::env::var("FINSCOUT_PIPELINE_ORGANIZATION") {
            self.pipeline.organization = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_CORPUS_DIR") {
            self.corpus.dir = v.into();
        }
        if let Ok(v) = std::env::var("FINSCOUT_CORPUS_COLLECTION") {
            self.corpus.collection = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_RETRIEVAL_VARIANTS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.variants = n;
        }
        if let Ok(v) = std::env::var("FINSCOUT_RETRIEVAL_TOP_K")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.top_k = n;
        }
        if let Ok(v) = std::env::var("FINSCOUT_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("FINSCOUT_EXTRACT_NAVIGATION_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.extract.navigation_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("FINSCOUT_EXTRACT_SELECTOR_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.extract.selector_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("FINSCOUT_EXTRACT_ALLOW_PRIVATE_HOSTS")
            && let Ok(allow) = v.parse::<bool>()
        {
            self.extract.allow_private_hosts = allow;
        }
    }
}
