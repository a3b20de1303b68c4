use crate::types::{JobRequest, JobResult};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics - defines only semantics, not runtime logic
/// Ensures API, CLI and worker never drift and Redis keys are deterministic

pub const QUEUE_NAME: &str = "codejudge:queue";
pub const RESULT_PREFIX: &str = "codejudge:result";
pub const STATUS_PREFIX: &str = "codejudge:status";

/// Default lifetime of stored results (24 hours)
pub const RESULT_TTL_SECONDS: u64 = 86400;

/// Generate result key for a job
pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

/// Generate status key for a job
pub fn status_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Push a job to the queue
/// Uses RPUSH for FIFO semantics
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    queue: &str,
    job: &JobRequest,
) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(serialization_error)?;
    conn.rpush(queue, payload).await
}

/// Pop a job from the queue
/// Uses BLPOP with timeout for graceful shutdown
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    queue: &str,
    timeout_seconds: f64,
) -> RedisResult<Option<JobRequest>> {
    let result: Option<(String, String)> = conn.blpop(queue, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: JobRequest = serde_json::from_str(&payload).map_err(serialization_error)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Store a job result in Redis, together with a status entry for quick lookup
pub async fn store_result(
    conn: &mut redis::aio::ConnectionManager,
    result: &JobResult,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let key = result_key(&result.job_id);
    let payload = serde_json::to_string(result).map_err(serialization_error)?;
    let _: () = conn.set_ex(&key, payload, ttl_seconds).await?;

    let status_payload =
        serde_json::to_string(&result.overall_status).map_err(serialization_error)?;
    let _: () = conn
        .set_ex(status_key(&result.job_id), status_payload, ttl_seconds)
        .await?;

    Ok(())
}

/// Retrieve a job result from Redis
pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JobResult>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let result: JobResult = serde_json::from_str(&data).map_err(serialization_error)?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_result_key_deterministic() {
        let id = Uuid::new_v4();
        let key1 = result_key(&id);
        let key2 = result_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("codejudge:result:"));
    }

    #[test]
    fn test_status_key_format() {
        let id = Uuid::new_v4();
        let key = status_key(&id);
        assert!(key.starts_with("codejudge:status:"));
        assert!(key.contains(&id.to_string()));
    }
}
