#![allow(dead_code)]

use campus_events::{
    auth::register::{Registrant, StudentProfile, TeacherProfile},
    enrolment::permission::EligibilityDescriptor,
    state::{
        db::{memory::MemoryDb, CampusDb},
        db_objects::{EventDetails, NewEvent},
    },
};
use chrono::Utc;
use std::time::Duration;

pub struct World {
    pub db: CampusDb,
    pub memory: MemoryDb,
    pub branch: i32,
    pub other_branch: i32,
    pub teacher: i32,
}

impl World {
    pub async fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let memory = MemoryDb::new(lock_timeout);
        let db = CampusDb::Memory(memory.clone());

        let faculty = memory.add_faculty("SCI", "Science").await;
        let branch = memory.add_branch(faculty, "CS", "Computer Science").await;
        let other_branch = memory.add_branch(faculty, "CHEM", "Chemistry").await;

        let teacher = db
            .register(
                "advisor@uni.ac.th".into(),
                "unused".into(),
                Registrant::Teacher(TeacherProfile {
                    title_name: "Aj.".into(),
                    first_name: "Nok".into(),
                    last_name: "Suksan".into(),
                    phone: None,
                    code: "T-9".into(),
                }),
            )
            .await
            .unwrap();

        Self {
            db,
            memory,
            branch,
            other_branch,
            teacher,
        }
    }

    pub async fn student(&self, n: u32, branch_id: i32, year: i32) -> i32 {
        self.db
            .register(
                format!("s{n}@uni.ac.th"),
                "unused".into(),
                Registrant::Student(StudentProfile {
                    title_name: "Mx".into(),
                    first_name: format!("S{n}"),
                    last_name: "Test".into(),
                    phone: None,
                    code: format!("66{n:05}"),
                    year,
                    branch_id,
                }),
            )
            .await
            .unwrap()
    }

    pub async fn students(&self, count: u32) -> Vec<i32> {
        let mut ids = Vec::with_capacity(count as usize);
        for n in 0..count {
            ids.push(self.student(n, self.branch, 1).await);
        }
        ids
    }

    pub async fn event(&self, free_space: i32, descriptor: EligibilityDescriptor) -> i32 {
        self.db
            .create_event(NewEvent {
                creator: self.teacher,
                limit: free_space,
                details: EventDetails {
                    event_name: "Community service".into(),
                    start_date: Utc::now(),
                    working_hour: 6,
                    detail: String::new(),
                    location: "Village school".into(),
                    descriptor: descriptor.encode().unwrap(),
                },
            })
            .await
            .unwrap()
    }

    pub async fn free_space(&self, event_id: i32) -> i32 {
        self.db
            .event_by_id(event_id)
            .await
            .unwrap()
            .unwrap()
            .free_space
    }

    pub async fn enrolled(&self, event_id: i32) -> i64 {
        self.db.count_enrolments(event_id).await.unwrap()
    }
}
